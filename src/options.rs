//! 引擎选项。

/// 引擎选项。
#[derive(Clone, Debug)]
pub struct Options {
    /// 跟踪每一步着法的执行与撤销。
    pub trace: bool,
    /// 输出效率信息。
    pub timing: bool,
    /// 单个着法最多包含的字母数，超过的路径不再展开。
    pub max_move_length: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trace: false,
            timing: false,
            max_move_length: 256,
        }
    }
}
