use super::check_scores_and_labels;
use crate::errors::LayerError;
use ndarray::Array2;

/// 多分类 SVM（hinge）损失
///
/// 对每个样本，非正确类别的 margin 为 max(0, x_j - x_{y_i} + 1)，
/// 损失为所有正 margin 之和对 batch 取平均。
///
/// 梯度：正 margin 的类别处为 1，正确类别处为 -(正 margin 个数)，整体除以 N。
///
/// # 参数
/// - `x`: 分数，形状 [N, C]，x[i, j] 是第 i 个样本在第 j 类上的分数
/// - `y`: 标签，长度 N，0 <= y[i] < C
///
/// # 返回
/// (损失, dx [N, C])
pub fn svm_loss(x: &Array2<f32>, y: &[usize]) -> Result<(f32, Array2<f32>), LayerError> {
    check_scores_and_labels(x, y)?;
    let (batch_size, num_classes) = x.dim();

    let mut loss = 0.0f32;
    let mut dx = Array2::zeros((batch_size, num_classes));
    for (n, &label) in y.iter().enumerate() {
        let correct_score = x[[n, label]];
        let mut num_pos = 0usize;
        for c in 0..num_classes {
            if c == label {
                continue;
            }
            let margin = x[[n, c]] - correct_score + 1.0;
            if margin > 0.0 {
                loss += margin;
                dx[[n, c]] = 1.0;
                num_pos += 1;
            }
        }
        dx[[n, label]] -= num_pos as f32;
    }

    loss /= batch_size as f32;
    dx /= batch_size as f32;
    Ok((loss, dx))
}
