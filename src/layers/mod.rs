/*
 * @Description  : 各层的前向/反向纯函数
 *
 * 约定：
 * - 前向函数返回 (输出, 缓存)，缓存持有反向传播所需的中间量
 * - 反向函数接收上游梯度和缓存，返回对各可微输入的梯度
 * - 所有函数不持有状态、不修改入参（BatchNormParam 的 running 统计量除外，
 *   其由前向函数原地更新，与训练循环的使用方式一致）
 */

mod affine;
mod batch_norm;
mod conv2d;
mod dropout;
mod max_pool2d;
mod relu;
mod spatial_batch_norm;

#[cfg(test)]
mod tests;

pub use affine::{affine_backward, affine_forward, AffineCache};
pub use batch_norm::{
    batch_norm_backward, batch_norm_backward_alt, batch_norm_forward, BatchNormCache,
    BatchNormParam,
};
pub use conv2d::{conv2d_backward, conv2d_forward, Conv2dCache, Conv2dParam};
pub use dropout::{dropout_backward, dropout_forward, DropoutCache, DropoutParam};
pub use max_pool2d::{max_pool2d_backward, max_pool2d_forward, MaxPool2dCache, MaxPool2dParam};
pub use relu::{relu_backward, relu_forward, ReluCache};
pub use spatial_batch_norm::{spatial_batch_norm_backward, spatial_batch_norm_forward};

/// 训练/评估模式（影响 batch norm 的统计量来源和 dropout 的掩码行为）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    pub const fn is_train(self) -> bool {
        matches!(self, Self::Train)
    }
}
