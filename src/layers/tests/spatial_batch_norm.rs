use crate::layers::{
    spatial_batch_norm_backward, spatial_batch_norm_forward, BatchNormParam, Mode,
};
use crate::utils::testing::{assert_arr_approx_eq, max_rel_error, numeric_grad};
use ndarray::{arr1, Array1, Array4, Axis};

fn fixture() -> (Array4<f32>, Array1<f32>, Array1<f32>) {
    let x = Array4::from_shape_vec(
        (2, 2, 2, 2),
        vec![
            1.0, 2.0, 3.0, 4.0, // n0 c0
            5.0, 6.0, 7.0, 8.0, // n0 c1
            0.0, -1.0, -2.0, -3.0, // n1 c0
            2.0, 4.0, 6.0, 8.0, // n1 c1
        ],
    )
    .unwrap();
    let gamma = arr1(&[1.0, 2.0]);
    let beta = arr1(&[0.0, 0.5]);
    (x, gamma, beta)
}

#[test]
fn test_spatial_batch_norm_forward() {
    // 每个像素视为一个样本，按通道归一化（期望值用NumPy核对）
    let (x, gamma, beta) = fixture();
    let mut param = BatchNormParam::new(2);
    let (out, cache) = spatial_batch_norm_forward(&x, &gamma, &beta, &mut param).unwrap();
    assert!(cache.is_some());

    let expected = Array4::from_shape_vec(
        (2, 2, 2, 2),
        vec![
            0.218218, 0.654653, 1.091088, 1.527524, -0.281132, 0.760377, 1.801887, 2.843397,
            -0.218218, -0.654653, -1.091088, -1.527524, -3.405662, -1.322642, 0.760377, 2.843397,
        ],
    )
    .unwrap();
    assert_arr_approx_eq(out.view().into_dyn(), expected.view().into_dyn(), 1e-4);

    // running 统计量按通道更新：通道均值 [0.5, 5.75]，方差 [5.25, 3.6875]
    assert_arr_approx_eq(
        param.running_mean.view().into_dyn(),
        arr1(&[0.05, 0.575]).view().into_dyn(),
        1e-5,
    );
    assert_arr_approx_eq(
        param.running_var.view().into_dyn(),
        arr1(&[0.525, 0.36875]).view().into_dyn(),
        1e-5,
    );
}

#[test]
fn test_spatial_batch_norm_normalizes_each_channel() {
    // gamma=1、beta=0 时输出每个通道的均值应为 0、方差应为 1
    let (x, ..) = fixture();
    let gamma = arr1(&[1.0, 1.0]);
    let beta = arr1(&[0.0, 0.0]);
    let mut param = BatchNormParam::new(2);
    let (out, _) = spatial_batch_norm_forward(&x, &gamma, &beta, &mut param).unwrap();

    for c in 0..2 {
        let channel = out.index_axis(Axis(1), c);
        let mean = channel.mean().unwrap();
        let var = channel.mapv(|v| (v - mean) * (v - mean)).mean().unwrap();
        assert!(mean.abs() < 1e-5, "通道 {c} 的均值 {mean} 不接近 0");
        assert!((var - 1.0).abs() < 1e-3, "通道 {c} 的方差 {var} 不接近 1");
    }
}

#[test]
fn test_spatial_batch_norm_eval_mode() {
    // 评估模式：按通道用 running 统计量归一化，不产生缓存
    let (x, gamma, beta) = fixture();
    let mut param = BatchNormParam::new(2).with_mode(Mode::Eval);
    param.running_mean = arr1(&[0.5, 5.75]);
    param.running_var = arr1(&[5.25, 3.6875]);

    let (out, cache) = spatial_batch_norm_forward(&x, &gamma, &beta, &mut param).unwrap();
    assert!(cache.is_none());

    // running 统计量恰为本 batch 的统计量时，输出与训练模式一致
    let expected = Array4::from_shape_vec(
        (2, 2, 2, 2),
        vec![
            0.218218, 0.654653, 1.091088, 1.527524, -0.281132, 0.760377, 1.801887, 2.843397,
            -0.218218, -0.654653, -1.091088, -1.527524, -3.405662, -1.322642, 0.760377, 2.843397,
        ],
    )
    .unwrap();
    assert_arr_approx_eq(out.view().into_dyn(), expected.view().into_dyn(), 1e-3);
}

#[test]
fn test_spatial_batch_norm_gradient_check() {
    // 解析梯度与中心差分数值梯度对比
    let (x, gamma, beta) = fixture();
    let dout = Array4::from_shape_vec(
        (2, 2, 2, 2),
        vec![
            0.3, -0.7, 0.2, 0.5, 0.1, -0.4, -0.2, 0.6, 0.3, 0.1, -0.5, 0.4, 0.2, -0.3, 0.6, -0.1,
        ],
    )
    .unwrap();

    let mut param = BatchNormParam::new(2);
    let (_, cache) = spatial_batch_norm_forward(&x, &gamma, &beta, &mut param).unwrap();
    let (dx, dgamma, dbeta) = spatial_batch_norm_backward(&dout, &cache.unwrap()).unwrap();

    // 1. dx
    let num_dx = numeric_grad(
        |probe| {
            let x_probe =
                Array4::from_shape_vec((2, 2, 2, 2), probe.iter().copied().collect()).unwrap();
            let mut p = BatchNormParam::new(2);
            let (out, _) = spatial_batch_norm_forward(&x_probe, &gamma, &beta, &mut p).unwrap();
            (out * &dout).sum()
        },
        &x.clone().into_dyn(),
        1e-2,
    );
    assert!(max_rel_error(dx.view().into_dyn(), num_dx.view()) < 3e-2);

    // 2. dgamma
    let num_dgamma = numeric_grad(
        |probe| {
            let g_probe = Array1::from_vec(probe.iter().copied().collect());
            let mut p = BatchNormParam::new(2);
            let (out, _) = spatial_batch_norm_forward(&x, &g_probe, &beta, &mut p).unwrap();
            (out * &dout).sum()
        },
        &gamma.clone().into_dyn(),
        1e-2,
    );
    assert!(max_rel_error(dgamma.view().into_dyn(), num_dgamma.view()) < 1e-2);

    // 3. dbeta
    let num_dbeta = numeric_grad(
        |probe| {
            let b_probe = Array1::from_vec(probe.iter().copied().collect());
            let mut p = BatchNormParam::new(2);
            let (out, _) = spatial_batch_norm_forward(&x, &gamma, &b_probe, &mut p).unwrap();
            (out * &dout).sum()
        },
        &beta.clone().into_dyn(),
        1e-2,
    );
    assert!(max_rel_error(dbeta.view().into_dyn(), num_dbeta.view()) < 1e-2);
}
