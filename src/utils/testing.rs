//! 单元测试共用的数值工具：数值梯度与近似相等断言

use ndarray::{ArrayD, ArrayViewD};

/// 断言两个张量近似相等（形状完全一致，逐元素误差小于容差）
pub fn assert_arr_approx_eq(actual: ArrayViewD<f32>, expected: ArrayViewD<f32>, tolerance: f32) {
    assert_eq!(
        actual.shape(),
        expected.shape(),
        "形状不匹配: {:?} vs {:?}",
        actual.shape(),
        expected.shape()
    );
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() < tolerance,
            "索引 {} 处值不匹配: {} vs {}，误差 {} 超过容差 {}",
            i,
            a,
            e,
            (a - e).abs(),
            tolerance
        );
    }
}

/// 中心差分数值梯度：grad[i] = (f(x + h·e_i) - f(x - h·e_i)) / (2h)
///
/// 用于核对解析反向传播。要求被测函数在 x 的 ±h 邻域内光滑
/// （对 ReLU/max 这类分段函数，测试数据须离拐点足够远）。
pub fn numeric_grad<F>(f: F, x: &ArrayD<f32>, h: f32) -> ArrayD<f32>
where
    F: Fn(&ArrayD<f32>) -> f32,
{
    let mut probe = x.clone();
    let mut grad = ArrayD::zeros(x.raw_dim());
    for i in 0..x.len() {
        let orig = probe.as_slice().unwrap()[i];
        probe.as_slice_mut().unwrap()[i] = orig + h;
        let f_plus = f(&probe);
        probe.as_slice_mut().unwrap()[i] = orig - h;
        let f_minus = f(&probe);
        probe.as_slice_mut().unwrap()[i] = orig;
        grad.as_slice_mut().unwrap()[i] = (f_plus - f_minus) / (2.0 * h);
    }
    grad
}

/// 最大相对误差：max |a-b| / max(|a|+|b|, 1e-8)
pub fn max_rel_error(a: ArrayViewD<f32>, b: ArrayViewD<f32>) -> f32 {
    assert_eq!(a.shape(), b.shape(), "形状不匹配");
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).abs() / (x.abs() + y.abs()).max(1e-8))
        .fold(0.0f32, f32::max)
}
