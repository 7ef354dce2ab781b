//! 运行时对象模型
//!
//! 封闭的带标签值类型（tagged variant），穷举匹配代替开放的类型链：
//! - `value`: Value 枚举和共享对象（字符串、外部对象）
//! - `array`: 定型原生数组
//! - `code`: 编译后代码单元

pub mod array;
pub mod code;
pub mod value;
