//! # Only Layers
//!
//! `only_layers`是一个教学用的神经网络层函数库：每个层只提供一对无状态的
//! 前向/反向纯函数（仿照[cs231n](http://cs231n.stanford.edu)的layers结构），
//! 不含计算图、优化器等任何编排机制。
//!
//! 前向函数接收输入/参数，返回输出和反向传播所需的缓存；
//! 反向函数接收上游梯度和缓存，返回对各可微输入的梯度。

pub mod errors;
pub mod layers;
pub mod loss;
pub mod utils;
