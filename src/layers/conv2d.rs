/*
 * @Description  : 2D 卷积层（朴素实现）
 *
 * - Batch-First 格式：输入 4D [N, C, H, W]，卷积核 [F, C, HH, WW]
 * - 输出 [N, F, H', W']，H' = 1 + (H + 2*pad - HH) / stride
 * - 两侧各零填充 pad 个像素，H/W 方向共用同一 stride
 * - 朴素窗口循环，用 Rayon 在 batch 维度并行加速
 */

use crate::errors::LayerError;
use ndarray::{s, Array1, Array4, Axis};
use rayon::prelude::*;

/// 卷积超参数
#[derive(Debug, Clone, Copy)]
pub struct Conv2dParam {
    /// 相邻感受野的像素间隔（H/W 方向相同）
    pub stride: usize,
    /// 输入 H/W 两侧的零填充像素数
    pub pad: usize,
}

/// 卷积反向传播所需的缓存
#[derive(Debug, Clone)]
pub struct Conv2dCache {
    x: Array4<f32>,
    w: Array4<f32>,
    param: Conv2dParam,
}

/// 按超参数计算输出尺寸，不能整除或窗口超界时报错
fn output_size(input: usize, kernel: usize, stride: usize, pad: usize) -> Result<usize, LayerError> {
    let padded = input + 2 * pad;
    if padded < kernel {
        return Err(LayerError::InvalidParameter(format!(
            "卷积核尺寸 {kernel} 超出填充后的输入尺寸 {padded}"
        )));
    }
    if (padded - kernel) % stride != 0 {
        return Err(LayerError::InvalidParameter(format!(
            "步长 {stride} 无法整除 (输入 {input} + 2*填充 {pad} - 核 {kernel})"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

/// 对输入做零填充，输入必须是 4D [N, C, H, W]
fn pad_input(x: &Array4<f32>, pad: usize) -> Array4<f32> {
    if pad == 0 {
        return x.clone();
    }
    let (batch_size, channels, input_h, input_w) = x.dim();
    let mut padded = Array4::zeros((batch_size, channels, input_h + 2 * pad, input_w + 2 * pad));
    padded
        .slice_mut(s![.., .., pad..pad + input_h, pad..pad + input_w])
        .assign(x);
    padded
}

/// 2D 卷积前向传播
///
/// # 参数
/// - `x`: 输入数据，形状 [N, C, H, W]
/// - `w`: 卷积核，形状 [F, C, HH, WW]
/// - `b`: 每个卷积核的偏置，形状 [F]
/// - `param`: 步长与填充
///
/// # 返回
/// (输出 [N, F, H', W'], 缓存)
pub fn conv2d_forward(
    x: &Array4<f32>,
    w: &Array4<f32>,
    b: &Array1<f32>,
    param: &Conv2dParam,
) -> Result<(Array4<f32>, Conv2dCache), LayerError> {
    let (batch_size, in_c, input_h, input_w) = x.dim();
    let (num_filter, kernel_c, kernel_h, kernel_w) = w.dim();

    // 1. 验证
    if param.stride == 0 {
        return Err(LayerError::InvalidParameter("步长须为正数".to_string()));
    }
    if kernel_c != in_c {
        return Err(LayerError::ShapeMismatch {
            expected: vec![num_filter, in_c, kernel_h, kernel_w],
            got: w.shape().to_vec(),
            message: format!("输入通道数 {in_c} 与卷积核通道数 {kernel_c} 不匹配"),
        });
    }
    if b.len() != num_filter {
        return Err(LayerError::ShapeMismatch {
            expected: vec![num_filter],
            got: vec![b.len()],
            message: "偏置长度须等于卷积核个数 F".to_string(),
        });
    }

    // 2. 计算输出尺寸
    let out_h = output_size(input_h, kernel_h, param.stride, param.pad)?;
    let out_w = output_size(input_w, kernel_w, param.stride, param.pad)?;

    // 3. 填充后逐窗口卷积，Rayon 并行处理每个 batch 样本
    let padded = pad_input(x, param.pad);
    let single_sample_size = num_filter * out_h * out_w;
    let batch_results: Vec<Vec<f32>> = (0..batch_size)
        .into_par_iter()
        .map(|n| {
            let mut sample_data = vec![0.0f32; single_sample_size];
            for f in 0..num_filter {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let h_start = oh * param.stride;
                        let w_start = ow * param.stride;
                        let mut sum = b[f];
                        for c in 0..in_c {
                            for kh in 0..kernel_h {
                                for kw in 0..kernel_w {
                                    sum += padded[[n, c, h_start + kh, w_start + kw]]
                                        * w[[f, c, kh, kw]];
                                }
                            }
                        }
                        sample_data[f * out_h * out_w + oh * out_w + ow] = sum;
                    }
                }
            }
            sample_data
        })
        .collect();

    // 4. 合并结果
    let all_data: Vec<f32> = batch_results.into_iter().flatten().collect();
    let out = Array4::from_shape_vec((batch_size, num_filter, out_h, out_w), all_data).unwrap();

    let cache = Conv2dCache {
        x: x.clone(),
        w: w.clone(),
        param: *param,
    };
    Ok((out, cache))
}

/// 2D 卷积反向传播
///
/// 对数据和卷积核的梯度本质上也是卷积：
/// - dx：把 w[f] * dout[n,f,oh,ow] 散射回各感受野（越过填充边界的部分丢弃）
/// - dw：各感受野窗口乘上游梯度后跨 batch 累加
/// - db[f] = Σ dout[:, f, :, :]
///
/// # 返回
/// (dx [N, C, H, W], dw [F, C, HH, WW], db [F])
pub fn conv2d_backward(
    dout: &Array4<f32>,
    cache: &Conv2dCache,
) -> Result<(Array4<f32>, Array4<f32>, Array1<f32>), LayerError> {
    let (batch_size, in_c, input_h, input_w) = cache.x.dim();
    let (num_filter, _, kernel_h, kernel_w) = cache.w.dim();
    let stride = cache.param.stride;
    let pad = cache.param.pad;

    // 前向已验证过整除性，这里不会再失败
    let out_h = output_size(input_h, kernel_h, stride, pad)?;
    let out_w = output_size(input_w, kernel_w, stride, pad)?;

    // 1. 验证上游梯度形状
    if dout.dim() != (batch_size, num_filter, out_h, out_w) {
        return Err(LayerError::ShapeMismatch {
            expected: vec![batch_size, num_filter, out_h, out_w],
            got: dout.shape().to_vec(),
            message: "上游梯度形状须为 [N, F, H', W']".to_string(),
        });
    }

    let padded = pad_input(&cache.x, pad);

    // 2. dx：Rayon 并行处理每个 batch 样本（样本间互不影响）
    let single_sample_size = in_c * input_h * input_w;
    let dx_results: Vec<Vec<f32>> = (0..batch_size)
        .into_par_iter()
        .map(|n| {
            let mut sample_grad = vec![0.0f32; single_sample_size];
            for f in 0..num_filter {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let grad_val = dout[[n, f, oh, ow]];
                        let h_start = oh * stride;
                        let w_start = ow * stride;
                        for c in 0..in_c {
                            for kh in 0..kernel_h {
                                for kw in 0..kernel_w {
                                    // 减去填充偏移，越界的位置落在填充区，丢弃
                                    let orig_h = (h_start + kh) as isize - pad as isize;
                                    let orig_w = (w_start + kw) as isize - pad as isize;
                                    if orig_h >= 0
                                        && orig_h < input_h as isize
                                        && orig_w >= 0
                                        && orig_w < input_w as isize
                                    {
                                        let idx = c * input_h * input_w
                                            + orig_h as usize * input_w
                                            + orig_w as usize;
                                        sample_grad[idx] += grad_val * cache.w[[f, c, kh, kw]];
                                    }
                                }
                            }
                        }
                    }
                }
            }
            sample_grad
        })
        .collect();
    let dx_data: Vec<f32> = dx_results.into_iter().flatten().collect();
    let dx = Array4::from_shape_vec((batch_size, in_c, input_h, input_w), dx_data).unwrap();

    // 3. dw：并行算出每个样本的部分梯度，再跨 batch 累加（map-reduce）
    let kernel_size = num_filter * in_c * kernel_h * kernel_w;
    let dw_partials: Vec<Vec<f32>> = (0..batch_size)
        .into_par_iter()
        .map(|n| {
            let mut sample_grad = vec![0.0f32; kernel_size];
            for f in 0..num_filter {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let grad_val = dout[[n, f, oh, ow]];
                        let h_start = oh * stride;
                        let w_start = ow * stride;
                        for c in 0..in_c {
                            for kh in 0..kernel_h {
                                for kw in 0..kernel_w {
                                    let idx = f * in_c * kernel_h * kernel_w
                                        + c * kernel_h * kernel_w
                                        + kh * kernel_w
                                        + kw;
                                    sample_grad[idx] +=
                                        grad_val * padded[[n, c, h_start + kh, w_start + kw]];
                                }
                            }
                        }
                    }
                }
            }
            sample_grad
        })
        .collect();
    let mut dw_data = vec![0.0f32; kernel_size];
    for sample_grad in dw_partials {
        for (acc, g) in dw_data.iter_mut().zip(sample_grad) {
            *acc += g;
        }
    }
    let dw = Array4::from_shape_vec((num_filter, in_c, kernel_h, kernel_w), dw_data).unwrap();

    // 4. db：上游梯度沿 N、H'、W' 三个维度收束
    let db = dout
        .sum_axis(Axis(0))
        .sum_axis(Axis(2))
        .sum_axis(Axis(1));

    Ok((dx, dw, db))
}
