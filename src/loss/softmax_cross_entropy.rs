use super::check_scores_and_labels;
use crate::errors::LayerError;
use ndarray::Array2;

/// Softmax + 交叉熵损失（融合计算）
///
/// 数值稳定做法：先减去每行最大值再取指数（log-sum-exp 技巧），
/// 避免 exp 溢出：
/// ```text
/// log_prob_i = (x_i - max) - log(Σ exp(x_j - max))
/// loss       = -mean(log_prob[y])
/// ```
/// 融合后的梯度非常简洁：dx = (softmax(x) - onehot(y)) / N。
///
/// # 参数
/// - `x`: 分数（logits），形状 [N, C]
/// - `y`: 标签，长度 N，0 <= y[i] < C
///
/// # 返回
/// (损失, dx [N, C])
pub fn softmax_loss(x: &Array2<f32>, y: &[usize]) -> Result<(f32, Array2<f32>), LayerError> {
    check_scores_and_labels(x, y)?;
    let (batch_size, num_classes) = x.dim();

    let mut loss = 0.0f32;
    let mut dx = Array2::zeros((batch_size, num_classes));
    for (n, &label) in y.iter().enumerate() {
        // 1. 每行减最大值后做 log-sum-exp
        let row = x.row(n);
        let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum_exp = 0.0f32;
        for c in 0..num_classes {
            let exp_val = (row[c] - max_val).exp();
            dx[[n, c]] = exp_val;
            sum_exp += exp_val;
        }
        let log_sum_exp = sum_exp.ln();

        // 2. 损失取正确类别的负对数概率
        loss += -(row[label] - max_val - log_sum_exp);

        // 3. 梯度：softmax 概率在正确类别处减 1
        for c in 0..num_classes {
            dx[[n, c]] /= sum_exp;
        }
        dx[[n, label]] -= 1.0;
    }

    loss /= batch_size as f32;
    dx /= batch_size as f32;
    Ok((loss, dx))
}
