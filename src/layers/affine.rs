/*
 * @Description  : 仿射（全连接）层
 *
 * 输入 x 形状为 [N, d_1, ..., d_k]，先摊平成 [N, D]（D = d_1 * ... * d_k），
 * 再做 out = x·w + b，w 形状 [D, M]，b 形状 [M]。
 */

use crate::errors::LayerError;
use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};

/// 仿射层反向传播所需的缓存
#[derive(Debug, Clone)]
pub struct AffineCache {
    /// 原始输入形状（用于还原 dx）
    x_shape: Vec<usize>,
    /// 摊平后的输入 [N, D]
    x_flat: Array2<f32>,
    /// 权重 [D, M]
    w: Array2<f32>,
}

/// 仿射层前向传播
///
/// # 参数
/// - `x`: 输入数据，形状 [N, d_1, ..., d_k]
/// - `w`: 权重，形状 [D, M]，D = d_1 * ... * d_k
/// - `b`: 偏置，形状 [M]
///
/// # 返回
/// (输出 [N, M], 缓存)
pub fn affine_forward(
    x: &ArrayD<f32>,
    w: &Array2<f32>,
    b: &Array1<f32>,
) -> Result<(Array2<f32>, AffineCache), LayerError> {
    // 1. 验证输入维度：至少 [N, d_1]
    if x.ndim() < 2 {
        return Err(LayerError::ShapeMismatch {
            expected: vec![0, 0],
            got: x.shape().to_vec(),
            message: "仿射层输入须至少为 2 维 [N, d_1, ...]".to_string(),
        });
    }

    // 2. 验证摊平维度与权重、偏置的一致性
    let batch_size = x.shape()[0];
    let flat_dim: usize = x.shape()[1..].iter().product();
    if w.nrows() != flat_dim {
        return Err(LayerError::ShapeMismatch {
            expected: vec![flat_dim, w.ncols()],
            got: vec![w.nrows(), w.ncols()],
            message: format!("输入摊平维度 D={flat_dim} 与权重行数 {} 不匹配", w.nrows()),
        });
    }
    if b.len() != w.ncols() {
        return Err(LayerError::ShapeMismatch {
            expected: vec![w.ncols()],
            got: vec![b.len()],
            message: "偏置长度须等于权重列数 M".to_string(),
        });
    }

    // 3. 摊平成 [N, D] 后做矩阵乘法（iter 按行主序展开，故此构造不会失败）
    let x_flat =
        Array2::from_shape_vec((batch_size, flat_dim), x.iter().copied().collect()).unwrap();
    let out = x_flat.dot(w) + b;

    let cache = AffineCache {
        x_shape: x.shape().to_vec(),
        x_flat,
        w: w.clone(),
    };
    Ok((out, cache))
}

/// 仿射层反向传播
///
/// # 参数
/// - `dout`: 上游梯度，形状 [N, M]
/// - `cache`: 前向传播的缓存
///
/// # 返回
/// (dx [N, d_1, ..., d_k], dw [D, M], db [M])
pub fn affine_backward(
    dout: &Array2<f32>,
    cache: &AffineCache,
) -> Result<(ArrayD<f32>, Array2<f32>, Array1<f32>), LayerError> {
    let (batch_size, flat_dim) = cache.x_flat.dim();

    // 1. 验证上游梯度形状
    if dout.dim() != (batch_size, cache.w.ncols()) {
        return Err(LayerError::ShapeMismatch {
            expected: vec![batch_size, cache.w.ncols()],
            got: dout.shape().to_vec(),
            message: "上游梯度形状须为 [N, M]".to_string(),
        });
    }

    // 2. dx = dout·wᵀ，再还原回原始输入形状
    let dx_flat = dout.dot(&cache.w.t());
    debug_assert_eq!(dx_flat.dim(), (batch_size, flat_dim));
    let dx = ArrayD::from_shape_vec(IxDyn(&cache.x_shape), dx_flat.into_raw_vec()).unwrap();

    // 3. dw = xᵀ·dout；db 沿 batch 维求和
    let dw = cache.x_flat.t().dot(dout);
    let db = dout.sum_axis(Axis(0));

    Ok((dx, dw, db))
}
