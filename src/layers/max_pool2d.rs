/*
 * @Description  : 2D 最大池化层（朴素实现）
 *
 * - Batch-First 格式：输入 4D [N, C, H, W]，无填充
 * - 输出 [N, C, H', W']，H' = 1 + (H - pool_height) / stride
 * - 反向传播把梯度路由到窗口内最大值的位置（并列时行主序第一个最大值胜出）
 * - 用 Rayon 在 batch 维度并行加速
 */

use crate::errors::LayerError;
use ndarray::Array4;
use rayon::prelude::*;

/// 池化超参数
#[derive(Debug, Clone, Copy)]
pub struct MaxPool2dParam {
    pub pool_height: usize,
    pub pool_width: usize,
    /// 相邻池化窗口的间隔（H/W 方向相同）
    pub stride: usize,
}

/// 最大池化反向传播所需的缓存
#[derive(Debug, Clone)]
pub struct MaxPool2dCache {
    x: Array4<f32>,
    param: MaxPool2dParam,
}

fn check_param(
    x: &Array4<f32>,
    param: &MaxPool2dParam,
) -> Result<(usize, usize), LayerError> {
    let (_, _, input_h, input_w) = x.dim();
    if param.stride == 0 {
        return Err(LayerError::InvalidParameter("步长须为正数".to_string()));
    }
    if param.pool_height == 0 || param.pool_width == 0 {
        return Err(LayerError::InvalidParameter("池化窗口尺寸须为正数".to_string()));
    }
    if param.pool_height > input_h || param.pool_width > input_w {
        return Err(LayerError::InvalidParameter(format!(
            "池化窗口 {}x{} 超出输入尺寸 {input_h}x{input_w}",
            param.pool_height, param.pool_width
        )));
    }
    if (input_h - param.pool_height) % param.stride != 0
        || (input_w - param.pool_width) % param.stride != 0
    {
        return Err(LayerError::InvalidParameter(format!(
            "步长 {} 无法整除 (输入尺寸 - 池化窗口尺寸)",
            param.stride
        )));
    }
    let out_h = (input_h - param.pool_height) / param.stride + 1;
    let out_w = (input_w - param.pool_width) / param.stride + 1;
    Ok((out_h, out_w))
}

/// 最大池化前向传播
///
/// # 参数
/// - `x`: 输入数据，形状 [N, C, H, W]
/// - `param`: 池化窗口尺寸与步长
///
/// # 返回
/// (输出 [N, C, H', W'], 缓存)
pub fn max_pool2d_forward(
    x: &Array4<f32>,
    param: &MaxPool2dParam,
) -> Result<(Array4<f32>, MaxPool2dCache), LayerError> {
    let (batch_size, channels, _, _) = x.dim();
    let (out_h, out_w) = check_param(x, param)?;

    // 逐窗口取最大值，Rayon 并行处理每个 batch 样本
    let single_sample_size = channels * out_h * out_w;
    let batch_results: Vec<Vec<f32>> = (0..batch_size)
        .into_par_iter()
        .map(|n| {
            let mut sample_data = vec![0.0f32; single_sample_size];
            for c in 0..channels {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let h_start = oh * param.stride;
                        let w_start = ow * param.stride;
                        let mut max_val = f32::NEG_INFINITY;
                        for i in 0..param.pool_height {
                            for j in 0..param.pool_width {
                                let v = x[[n, c, h_start + i, w_start + j]];
                                if v > max_val {
                                    max_val = v;
                                }
                            }
                        }
                        sample_data[c * out_h * out_w + oh * out_w + ow] = max_val;
                    }
                }
            }
            sample_data
        })
        .collect();

    let all_data: Vec<f32> = batch_results.into_iter().flatten().collect();
    let out = Array4::from_shape_vec((batch_size, channels, out_h, out_w), all_data).unwrap();

    let cache = MaxPool2dCache {
        x: x.clone(),
        param: *param,
    };
    Ok((out, cache))
}

/// 最大池化反向传播
///
/// 最大池化相当于 max 门：梯度全部路由给窗口内的最大值，其余位置为 0。
/// 窗口重叠时同一输入位置的梯度会累加。
///
/// # 返回
/// dx，形状 [N, C, H, W]
pub fn max_pool2d_backward(
    dout: &Array4<f32>,
    cache: &MaxPool2dCache,
) -> Result<Array4<f32>, LayerError> {
    let (batch_size, channels, input_h, input_w) = cache.x.dim();
    let (out_h, out_w) = check_param(&cache.x, &cache.param)?;

    // 1. 验证上游梯度形状
    if dout.dim() != (batch_size, channels, out_h, out_w) {
        return Err(LayerError::ShapeMismatch {
            expected: vec![batch_size, channels, out_h, out_w],
            got: dout.shape().to_vec(),
            message: "上游梯度形状须为 [N, C, H', W']".to_string(),
        });
    }

    // 2. 重新定位每个窗口的最大值位置并散射梯度，Rayon 并行处理每个 batch 样本
    let x = &cache.x;
    let param = &cache.param;
    let single_sample_size = channels * input_h * input_w;
    let batch_results: Vec<Vec<f32>> = (0..batch_size)
        .into_par_iter()
        .map(|n| {
            let mut sample_grad = vec![0.0f32; single_sample_size];
            for c in 0..channels {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let h_start = oh * param.stride;
                        let w_start = ow * param.stride;
                        // 行主序扫描，第一个最大值胜出
                        let (mut max_i, mut max_j) = (0, 0);
                        let mut max_val = f32::NEG_INFINITY;
                        for i in 0..param.pool_height {
                            for j in 0..param.pool_width {
                                let v = x[[n, c, h_start + i, w_start + j]];
                                if v > max_val {
                                    max_val = v;
                                    max_i = i;
                                    max_j = j;
                                }
                            }
                        }
                        let idx = c * input_h * input_w
                            + (h_start + max_i) * input_w
                            + (w_start + max_j);
                        sample_grad[idx] += dout[[n, c, oh, ow]];
                    }
                }
            }
            sample_grad
        })
        .collect();

    let dx_data: Vec<f32> = batch_results.into_iter().flatten().collect();
    let dx = Array4::from_shape_vec((batch_size, channels, input_h, input_w), dx_data).unwrap();
    Ok(dx)
}
