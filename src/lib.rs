//! A board game rule compiler and engine.
//!
//! Piece movements are regular expressions over letters `(dx, dy, precondition){effect}`;
//! each piece rule is compiled to a DFA that the engine walks to generate moves.

#![deny(missing_docs)]

pub mod automaton;
pub mod frontend;
pub mod options;
pub mod runtime;
pub(crate) mod utils;

use std::{sync::Arc, time::Instant};

use anyhow::Result;
use tracing::info;
use options::Options;
use runtime::{Game, Rules, RulesBuilder};
use utils::SourceFile;

/// 编译器上下文
#[derive(Default)]
pub struct Context {
    builder: RulesBuilder,
    options: Options,
}

impl Context {
    /// 创建一个新的编译器上下文。
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置引擎选项。
    pub fn set_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// 编译源代码。
    pub fn add_file(mut self, filename: &str, source: &str) -> Result<Self> {
        let start = Instant::now();
        let file = SourceFile::new(filename, source);
        let program = match frontend::parse(source) {
            Ok(program) => program,
            Err(e) => anyhow::bail!("{}", e.to_snippet(&file)),
        };

        if let Err(e) = frontend::check::check_program(&program) {
            anyhow::bail!("{}", e.to_snippet(&file));
        }

        self.builder.program(program)?;
        if self.options.timing {
            info!("parsed {} in {:?}", filename, start.elapsed());
        }
        Ok(self)
    }

    /// 构建规则表。
    pub fn build_rules(self) -> Result<Arc<Rules>> {
        let start = Instant::now();
        let rules = self.builder.build()?;
        if self.options.timing {
            info!(
                pieces = rules.pieces.len(),
                "compiled rules in {:?}",
                start.elapsed()
            );
        }
        Ok(Arc::new(rules))
    }

    /// 构建规则表并开始一局。
    pub fn build(self) -> Result<Game> {
        let options = self.options.clone();
        let rules = self.build_rules()?;
        Ok(Game::new(rules, options))
    }
}

/// 编译源代码并开始一局。
pub fn compile(source: &str) -> Result<Game> {
    Context::new().add_file("<input>", source)?.build()
}
