/*
 * @Description  : Dropout 层
 *
 * 训练模式下对每个元素采样 u ∈ [0, 1)，u <= p 时置零（0/1 掩码，
 * 不做 1/(1-p) 缩放）；评估模式为恒等映射。
 * 可选 seed 使掩码可复现（梯度检验需要确定性，真实训练不需要）。
 */

use crate::errors::LayerError;
use crate::layers::Mode;
use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dropout 的超参数
#[derive(Debug, Clone, Copy)]
pub struct DropoutParam {
    /// 每个元素被置零的概率
    pub p: f32,
    pub mode: Mode,
    /// 随机数种子，Some 时掩码确定
    pub seed: Option<u64>,
}

/// Dropout 反向传播所需的缓存
#[derive(Debug, Clone)]
pub struct DropoutCache {
    mode: Mode,
    /// 0/1 掩码，仅训练模式产生
    mask: Option<ArrayD<f32>>,
}

impl DropoutCache {
    /// 训练模式下的 0/1 掩码（测试用）
    pub fn mask(&self) -> Option<&ArrayD<f32>> {
        self.mask.as_ref()
    }
}

/// 按元素采样 0/1 掩码：u ∈ [0, 1)，u <= p 处为 0
fn sample_mask<R: Rng>(x: &ArrayD<f32>, p: f32, rng: &mut R) -> ArrayD<f32> {
    ArrayD::from_shape_simple_fn(x.raw_dim(), || {
        if rng.gen::<f32>() <= p {
            0.0
        } else {
            1.0
        }
    })
}

/// Dropout 前向传播，输入可为任意形状
///
/// # 返回
/// (输出, 缓存)。训练模式下输出为 掩码 ⊙ x；评估模式下原样返回。
pub fn dropout_forward(
    x: &ArrayD<f32>,
    param: &DropoutParam,
) -> Result<(ArrayD<f32>, DropoutCache), LayerError> {
    // 1. 验证概率范围
    if !(0.0..1.0).contains(&param.p) {
        return Err(LayerError::InvalidParameter(format!(
            "dropout概率p须在[0, 1)内，得到 {}",
            param.p
        )));
    }

    match param.mode {
        Mode::Train => {
            // 2. 采样掩码：u <= p 处置零
            let mask = match param.seed {
                Some(seed) => sample_mask(x, param.p, &mut StdRng::seed_from_u64(seed)),
                None => sample_mask(x, param.p, &mut rand::thread_rng()),
            };

            let out = &mask * x;
            let cache = DropoutCache {
                mode: param.mode,
                mask: Some(mask),
            };
            Ok((out, cache))
        }
        Mode::Eval => Ok((
            x.clone(),
            DropoutCache {
                mode: param.mode,
                mask: None,
            },
        )),
    }
}

/// Dropout 反向传播：掩码为 0 的位置截断上游梯度；评估模式直接透传
pub fn dropout_backward(dout: &ArrayD<f32>, cache: &DropoutCache) -> ArrayD<f32> {
    match cache.mode {
        Mode::Train => {
            // 前向产生缓存时掩码必然存在
            let mask = cache.mask.as_ref().unwrap();
            debug_assert_eq!(dout.shape(), mask.shape());
            mask * dout
        }
        Mode::Eval => dout.clone(),
    }
}
