/*
 * @Description  : Batch Normalization 层
 *
 * 训练模式用 minibatch 的均值和（无偏置校正的）方差做归一化，并按
 *   running = momentum * running + (1 - momentum) * sample
 * 指数衰减更新 running 统计量；评估模式直接用 running 统计量归一化。
 *
 * 反向传播提供两个版本：
 * - `batch_norm_backward`：按计算图逐节点回传（教学推导）
 * - `batch_norm_backward_alt`：纸面化简后的闭式解，结果一致但更快
 */

use crate::errors::LayerError;
use crate::layers::Mode;
use ndarray::{Array1, Array2, Axis};

/// Batch norm 的超参数与 running 统计量
///
/// 前向传播在训练模式下会原地更新 `running_mean` / `running_var`，
/// 其余字段只读。
#[derive(Debug, Clone)]
pub struct BatchNormParam {
    pub mode: Mode,
    /// 数值稳定项，加在方差上再开方
    pub eps: f32,
    /// running 统计量的指数衰减系数
    pub momentum: f32,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
}

impl BatchNormParam {
    /// 按特征数创建默认参数：训练模式，eps=1e-5，momentum=0.9，
    /// running 统计量初始化为零
    pub fn new(num_features: usize) -> Self {
        Self {
            mode: Mode::Train,
            eps: 1e-5,
            momentum: 0.9,
            running_mean: Array1::zeros(num_features),
            running_var: Array1::zeros(num_features),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

/// Batch norm 反向传播所需的缓存（仅训练模式产生）
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    x: Array2<f32>,
    x_norm: Array2<f32>,
    gamma: Array1<f32>,
    mean: Array1<f32>,
    var: Array1<f32>,
    eps: f32,
}

/// Batch norm 前向传播
///
/// # 参数
/// - `x`: 输入数据，形状 [N, D]
/// - `gamma`: 缩放参数，形状 [D]
/// - `beta`: 平移参数，形状 [D]
/// - `param`: 超参数与 running 统计量（训练模式下原地更新）
///
/// # 返回
/// (输出 [N, D], 缓存)。评估模式不产生缓存（也就无从反向传播）。
pub fn batch_norm_forward(
    x: &Array2<f32>,
    gamma: &Array1<f32>,
    beta: &Array1<f32>,
    param: &mut BatchNormParam,
) -> Result<(Array2<f32>, Option<BatchNormCache>), LayerError> {
    let (batch_size, num_features) = x.dim();

    // 1. 验证
    if batch_size == 0 {
        return Err(LayerError::InvalidOperation("batch不能为空".to_string()));
    }
    for (name, len) in [
        ("gamma", gamma.len()),
        ("beta", beta.len()),
        ("running_mean", param.running_mean.len()),
        ("running_var", param.running_var.len()),
    ] {
        if len != num_features {
            return Err(LayerError::ShapeMismatch {
                expected: vec![num_features],
                got: vec![len],
                message: format!("{name}长度须等于特征数 D"),
            });
        }
    }
    if param.eps <= 0.0 {
        return Err(LayerError::InvalidParameter(format!(
            "eps须为正数，得到 {}",
            param.eps
        )));
    }

    match param.mode {
        Mode::Train => {
            // 2. minibatch 统计量（方差无偏置校正，ddof=0）
            let mean = x.mean_axis(Axis(0)).unwrap();
            let var = x.var_axis(Axis(0), 0.0);

            // 3. 归一化后缩放、平移
            let std = var.mapv(|v| (v + param.eps).sqrt());
            let x_norm = (x - &mean) / &std;
            let out = &x_norm * gamma + beta;

            // 4. 指数衰减更新 running 统计量
            let m = param.momentum;
            param.running_mean = &param.running_mean * m + &mean * (1.0 - m);
            param.running_var = &param.running_var * m + &var * (1.0 - m);

            let cache = BatchNormCache {
                x: x.clone(),
                x_norm,
                gamma: gamma.clone(),
                mean,
                var,
                eps: param.eps,
            };
            Ok((out, Some(cache)))
        }
        Mode::Eval => {
            // 评估模式：用 running 统计量归一化，不更新、不缓存
            let std = param.running_var.mapv(|v| (v + param.eps).sqrt());
            let x_norm = (x - &param.running_mean) / &std;
            let out = &x_norm * gamma + beta;
            Ok((out, None))
        }
    }
}

/// Batch norm 反向传播（计算图版本）
///
/// 把前向拆成 减均值 -> 除标准差 -> 缩放平移 三步，逐步回传：
/// 对方差和均值的梯度都要沿 batch 维收束，再摊回每个样本。
///
/// # 返回
/// (dx [N, D], dgamma [D], dbeta [D])
pub fn batch_norm_backward(
    dout: &Array2<f32>,
    cache: &BatchNormCache,
) -> Result<(Array2<f32>, Array1<f32>, Array1<f32>), LayerError> {
    check_dout_shape(dout, cache)?;
    let batch_size = cache.x.nrows() as f32;

    let dx_norm = dout * &cache.gamma;
    let centered = &cache.x - &cache.mean;

    // dvar = Σ dxn * (x - μ) * (-1/2) * (σ² + ε)^(-3/2)
    let var_pow = cache.var.mapv(|v| (v + cache.eps).powf(-1.5));
    let dvar = (&dx_norm * &centered * -0.5 * &var_pow).sum_axis(Axis(0));

    // dmean = Σ dxn * (-1/√(σ²+ε)) + dvar * Σ (-2(x-μ)) / N
    let inv_std = cache.var.mapv(|v| 1.0 / (v + cache.eps).sqrt());
    let dmean = (&dx_norm * &inv_std.mapv(|v| -v)).sum_axis(Axis(0))
        + (&centered * -2.0).sum_axis(Axis(0)) * &dvar / batch_size;

    // dx = dxn/√(σ²+ε) + 2*dvar*(x-μ)/N + dmean/N
    let dx =
        &dx_norm * &inv_std + &centered * 2.0 * &dvar / batch_size + &dmean / batch_size;

    let dgamma = (dout * &cache.x_norm).sum_axis(Axis(0));
    let dbeta = dout.sum_axis(Axis(0));
    Ok((dx, dgamma, dbeta))
}

/// Batch norm 反向传播（化简版本）
///
/// 纸面推导合并中间项后的单式：
/// dx = (1/N) * inv_std * (N*dxn - Σdxn - xn*Σ(dxn*xn))
pub fn batch_norm_backward_alt(
    dout: &Array2<f32>,
    cache: &BatchNormCache,
) -> Result<(Array2<f32>, Array1<f32>, Array1<f32>), LayerError> {
    check_dout_shape(dout, cache)?;
    let batch_size = cache.x.nrows() as f32;

    let dx_norm = dout * &cache.gamma;
    let inv_std = cache.var.mapv(|v| 1.0 / (v + cache.eps).sqrt());

    let sum_dxn = dx_norm.sum_axis(Axis(0));
    let sum_dxn_xn = (&dx_norm * &cache.x_norm).sum_axis(Axis(0));

    let dx = (&dx_norm * batch_size - &sum_dxn - &cache.x_norm * &sum_dxn_xn)
        * &inv_std
        / batch_size;

    let dgamma = (dout * &cache.x_norm).sum_axis(Axis(0));
    let dbeta = dout.sum_axis(Axis(0));
    Ok((dx, dgamma, dbeta))
}

fn check_dout_shape(dout: &Array2<f32>, cache: &BatchNormCache) -> Result<(), LayerError> {
    if dout.dim() != cache.x.dim() {
        return Err(LayerError::ShapeMismatch {
            expected: cache.x.shape().to_vec(),
            got: dout.shape().to_vec(),
            message: "上游梯度形状须与前向输入一致".to_string(),
        });
    }
    Ok(())
}
