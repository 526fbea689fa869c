/*
 * @Description  : 空间 Batch Normalization（NCHW）
 *
 * 把 [N, C, H, W] 的每个像素视为一个样本：先置换成 [N, H, W, C] 再摊平成
 * [N*H*W, C]，复用普通 batch norm 对 C 个通道做归一化，最后变换回原布局。
 */

use crate::errors::LayerError;
use crate::layers::batch_norm::{
    batch_norm_backward_alt, batch_norm_forward, BatchNormCache, BatchNormParam,
};
use ndarray::{Array1, Array2, Array4};

/// [N, C, H, W] -> [N*H*W, C]
fn to_channel_last(x: &Array4<f32>) -> Array2<f32> {
    let (batch_size, channels, height, width) = x.dim();
    x.view()
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .to_owned()
        .into_shape((batch_size * height * width, channels))
        .unwrap()
}

/// [N*H*W, C] -> [N, C, H, W]
fn to_channel_first(
    flat: Array2<f32>,
    (batch_size, channels, height, width): (usize, usize, usize, usize),
) -> Array4<f32> {
    flat.into_shape((batch_size, height, width, channels))
        .unwrap()
        .permuted_axes([0, 3, 1, 2])
        .as_standard_layout()
        .to_owned()
}

/// 空间 batch norm 前向传播
///
/// # 参数
/// - `x`: 输入数据，形状 [N, C, H, W]
/// - `gamma`: 缩放参数，形状 [C]
/// - `beta`: 平移参数，形状 [C]
/// - `param`: 超参数与 running 统计量（按通道，长度 C）
///
/// # 返回
/// (输出 [N, C, H, W], 缓存)。评估模式不产生缓存。
pub fn spatial_batch_norm_forward(
    x: &Array4<f32>,
    gamma: &Array1<f32>,
    beta: &Array1<f32>,
    param: &mut BatchNormParam,
) -> Result<(Array4<f32>, Option<BatchNormCache>), LayerError> {
    let dims = x.dim();
    let flat = to_channel_last(x);
    let (out_flat, cache) = batch_norm_forward(&flat, gamma, beta, param)?;
    Ok((to_channel_first(out_flat, dims), cache))
}

/// 空间 batch norm 反向传播
///
/// 对上游梯度做同样的布局变换后，委托给化简版的 batch norm 反向传播。
///
/// # 返回
/// (dx [N, C, H, W], dgamma [C], dbeta [C])
pub fn spatial_batch_norm_backward(
    dout: &Array4<f32>,
    cache: &BatchNormCache,
) -> Result<(Array4<f32>, Array1<f32>, Array1<f32>), LayerError> {
    let dims = dout.dim();
    let dout_flat = to_channel_last(dout);
    let (dx_flat, dgamma, dbeta) = batch_norm_backward_alt(&dout_flat, cache)?;
    Ok((to_channel_first(dx_flat, dims), dgamma, dbeta))
}
