use std::{fmt::Display, ops::Deref};

use annotate_snippets::{
    display_list::{DisplayList, FormatOptions},
    snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation},
};

/// 位置信息片段
///
/// `start` 与 `end` 是源文本中的字节偏移。
#[derive(Debug, Clone, PartialEq)]
pub struct Span<T> {
    inner: T,
    /// 起始偏移
    pub start: usize,
    /// 结束偏移
    pub end: usize,
}

impl<T: Display> Display for Span<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> Deref for Span<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> AsRef<T> for Span<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T> Span<T> {
    /// 创建一个新的 `Span`。
    pub fn new(inner: T, start: usize, end: usize) -> Self {
        Self { inner, start, end }
    }

    /// 转换为内部类型。
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// 源文件
#[derive(Debug, Clone, Copy)]
pub struct SourceFile<'a> {
    /// 文件名
    pub filename: &'a str,
    /// 源文本
    pub source: &'a str,
}

impl<'a> SourceFile<'a> {
    /// 创建一个新的 `SourceFile`。
    pub fn new(filename: &'a str, source: &'a str) -> Self {
        Self { filename, source }
    }

    /// 找到包含 `start..end` 的若干行。
    pub fn lines(&self, start: usize, end: usize) -> Option<LinesInfo<'a>> {
        if self.source.is_empty() {
            return None;
        }
        // Errors at end of input point at the last character.
        let start = start.min(self.source.len() - 1);
        let end = end.clamp(start + 1, self.source.len());

        let mut lines = self.source.split_inclusive('\n').enumerate();

        let mut line_begin = 0;
        let mut line_end = 0;
        let mut line_start = 0;
        for (i, line) in lines.by_ref() {
            let next = line_begin + line.len();
            if next > start {
                line_start = i + 1;
                line_end = next;
                break;
            }
            line_begin = next;
        }
        if line_start == 0 {
            return None;
        }

        for (_, line) in lines {
            if line_end >= end {
                break;
            }
            line_end += line.len();
        }

        Some(LinesInfo {
            filename: self.filename,
            source: self.source[line_begin..line_end].trim_end_matches('\n'),
            line_start,
            range: (start - line_begin, end.min(line_end) - line_begin),
        })
    }

    /// 生成带有源码标注的错误信息。
    pub fn snippet(&self, title: &str, label: &str, start: usize, end: usize) -> String {
        let slices = self
            .lines(start, end)
            .map(|lines| vec![lines.as_annotation(label, AnnotationType::Error)])
            .unwrap_or_default();

        let snippet = Snippet {
            title: Some(Annotation {
                id: None,
                label: Some(title),
                annotation_type: AnnotationType::Error,
            }),
            footer: vec![],
            slices,
            opt: FormatOptions {
                color: true,
                ..Default::default()
            },
        };

        DisplayList::from(snippet).to_string()
    }
}

/// 所在行的信息
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinesInfo<'a> {
    /// 文件名
    pub filename: &'a str,
    /// 包含 Span 的某几行
    pub source: &'a str,
    /// 起始行号
    pub line_start: usize,
    /// Span 在 source 中的切片
    pub range: (usize, usize),
}

impl<'a> LinesInfo<'a> {
    /// 转换为 `annotate_snippets` 的片段。
    pub fn as_annotation(&self, message: &'a str, annotation_type: AnnotationType) -> Slice<'a> {
        let end = self.range.1.min(self.source.len()).max(self.range.0);
        Slice {
            source: self.source,
            line_start: self.line_start,
            origin: Some(self.filename),
            annotations: vec![SourceAnnotation {
                range: (self.range.0, end),
                label: message,
                annotation_type,
            }],
            fold: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_of_single_line_span() {
        let file = SourceFile::new("a.game", "players = a;\npieces = P(a);\n");
        let lines = file.lines(13, 19).unwrap();
        assert_eq!(lines.line_start, 2);
        assert_eq!(lines.source, "pieces = P(a);");
        assert_eq!(lines.range, (0, 6));
    }

    #[test]
    fn lines_at_end_of_input() {
        let file = SourceFile::new("a.game", "players = a");
        let lines = file.lines(11, 11).unwrap();
        assert_eq!(lines.line_start, 1);
        assert_eq!(lines.range, (10, 11));
    }

    #[test]
    fn snippet_contains_label() {
        let file = SourceFile::new("a.game", "players = a$;");
        let text = file.snippet("lexical error", "unrecognized character", 11, 12);
        assert!(text.contains("unrecognized character"));
    }
}
