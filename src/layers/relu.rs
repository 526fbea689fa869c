/*
 * @Description  : ReLU 激活层
 *
 * forward: f(x) = max(0, x)
 * backward: x > 0 处透传上游梯度，其余位置为 0（x = 0 处取 0）
 */

use ndarray::{ArrayD, Zip};

/// ReLU 反向传播所需的缓存（即前向输入）
#[derive(Debug, Clone)]
pub struct ReluCache {
    x: ArrayD<f32>,
}

/// ReLU 前向传播，输入可为任意形状
pub fn relu_forward(x: &ArrayD<f32>) -> (ArrayD<f32>, ReluCache) {
    let out = x.mapv(|v| v.max(0.0));
    (out, ReluCache { x: x.clone() })
}

/// ReLU 反向传播
///
/// ReLU 相当于对每个元素的梯度开关：前向输入不大于 0 的位置梯度被截断。
pub fn relu_backward(dout: &ArrayD<f32>, cache: &ReluCache) -> ArrayD<f32> {
    debug_assert_eq!(dout.shape(), cache.x.shape());
    let mut dx = dout.clone();
    Zip::from(&mut dx).and(&cache.x).for_each(|g, &v| {
        if v <= 0.0 {
            *g = 0.0;
        }
    });
    dx
}
