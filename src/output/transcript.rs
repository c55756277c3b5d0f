// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/output/transcript.rs - 识别文本记录
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use tracing::{debug, warn};

use super::partial_path;

/// 把多行文本合并为一行：各行去掉首尾空白，丢弃空行，以单个空格连接
pub(crate) fn single_line(text: &str) -> String {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// 按检测顺序累积的识别文本，每个检测一条（可能为空串）
///
/// 视频按帧序拼接，同一帧内按检测顺序排列。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
  lines: Vec<String>,
}

impl Transcript {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, text: impl Into<String>) {
    self.lines.push(text.into());
  }

  pub fn len(&self) -> usize {
    self.lines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.lines.iter().map(String::as_str)
  }

  pub fn lines(&self) -> &[String] {
    &self.lines
  }

  /// 每条文本后接一个换行写入文件，覆盖已有内容
  ///
  /// 文本内部的换行被合并为空格，文件行数始终等于条目数。
  pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
    let partial = partial_path(path);
    let result = self.write_lines(&partial).and_then(|_| std::fs::rename(&partial, path));
    if result.is_err() && partial.exists() {
      if let Err(e) = std::fs::remove_file(&partial) {
        warn!("清理临时文件失败 {}: {}", partial.display(), e);
      }
    }
    result?;

    debug!("写入识别文本 {}: {} 条", path.display(), self.lines.len());
    Ok(())
  }

  fn write_lines(&self, path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for line in &self.lines {
      if line.contains(['\n', '\r']) {
        writeln!(writer, "{}", single_line(line))?;
      } else {
        writeln!(writer, "{}", line)?;
      }
    }
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()
  }
}

impl Extend<String> for Transcript {
  fn extend<T: IntoIterator<Item = String>>(&mut self, iter: T) {
    self.lines.extend(iter);
  }
}

impl From<Vec<String>> for Transcript {
  fn from(lines: Vec<String>) -> Self {
    Self { lines }
  }
}

impl IntoIterator for Transcript {
  type Item = String;
  type IntoIter = std::vec::IntoIter<String>;

  fn into_iter(self) -> Self::IntoIter {
    self.lines.into_iter()
  }
}
