//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存键的生成方式：按方法名和参数拼接的默认生成器，以及带命名占位符的键模板。

use crate::error::{CacheError, Result};
use std::collections::HashMap;
use std::fmt::Display;

/// 缓存键生成器
///
/// 同样的方法名和参数必须得到同样的键
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, method: &str, args: &[&dyn Display]) -> String;
}

/// 默认键生成器，格式为 `prefix:method:arg1:arg2`
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyGenerator {
    prefix: Option<String>,
}

impl DefaultKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl KeyGenerator for DefaultKeyGenerator {
    fn generate(&self, method: &str, args: &[&dyn Display]) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(args.len() + 2);
        if let Some(prefix) = self.prefix.as_deref().filter(|p| !p.is_empty()) {
            parts.push(prefix.to_string());
        }
        parts.push(method.to_string());
        parts.extend(args.iter().map(|arg| arg.to_string()));
        parts.join(":")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// 键模板，例如 `user:{id}:profile`
///
/// 解析在构造时完成；`{{` 和 `}}` 表示字面量花括号
#[derive(Debug, Clone)]
pub struct KeyTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl KeyTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    let name = name.trim().to_string();
                    if !closed || name.is_empty() {
                        return Err(CacheError::ConfigError(format!(
                            "invalid key template '{}'",
                            template
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(name));
                }
                '}' => {
                    return Err(CacheError::ConfigError(format!(
                        "unmatched '}}' in key template '{}'",
                        template
                    )));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 模板中引用的变量名，按出现顺序
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// 用命名变量渲染模板，引用了未提供的变量时返回错误
    pub fn render<V: Display>(&self, vars: &HashMap<&str, V>) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    let value = vars.get(name.as_str()).ok_or_else(|| {
                        CacheError::ConfigError(format!(
                            "unknown variable '{}' in key template '{}'",
                            name, self.source
                        ))
                    })?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

impl std::str::FromStr for KeyTemplate {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
