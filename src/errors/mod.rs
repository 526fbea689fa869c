use thiserror::Error;

/// 层函数的统一错误类型
#[derive(Error, Debug, PartialEq)]
pub enum LayerError {
    /// 形状校验失败
    #[error("形状不匹配：预期 {expected:?}，得到 {got:?}。{message}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },

    /// 超参数非法（如dropout概率越界、步长为零等）
    #[error("参数非法：{0}")]
    InvalidParameter(String),

    /// 调用方式非法（如标签越界、空batch等）
    #[error("非法操作：{0}")]
    InvalidOperation(String),
}
