/*
 * @Description  : 损失函数
 *
 * 每个损失函数一次调用同时返回 (标量损失, 对输入分数的梯度)。
 * 输入分数形状 [N, C]，标签为类别下标（不是 one-hot）。
 */

mod softmax_cross_entropy;
mod svm;


pub use softmax_cross_entropy::softmax_loss;
pub use svm::svm_loss;

use crate::errors::LayerError;
use ndarray::Array2;

/// 校验分数与标签：batch 非空、标签数与 N 一致、类别下标在界内
fn check_scores_and_labels(x: &Array2<f32>, y: &[usize]) -> Result<(), LayerError> {
    let (batch_size, num_classes) = x.dim();
    if batch_size == 0 {
        return Err(LayerError::InvalidOperation("batch不能为空".to_string()));
    }
    if y.len() != batch_size {
        return Err(LayerError::ShapeMismatch {
            expected: vec![batch_size],
            got: vec![y.len()],
            message: "标签数须等于batch大小 N".to_string(),
        });
    }
    if let Some(&bad) = y.iter().find(|&&label| label >= num_classes) {
        return Err(LayerError::InvalidOperation(format!(
            "标签 {bad} 越界（类别数为 {num_classes}）"
        )));
    }
    Ok(())
}
