// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/media.rs - 媒体类型分派与输出布局
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

use std::path::{Path, PathBuf};

use crate::error::PipelineError;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Image,
  Video,
}

/// 按扩展名（不区分大小写）判断媒体类型
pub fn classify(path: &Path) -> Result<MediaKind, PipelineError> {
  let extension = path
    .extension()
    .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default();

  if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
    Ok(MediaKind::Image)
  } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
    Ok(MediaKind::Video)
  } else {
    Err(PipelineError::UnsupportedFormat { extension })
  }
}

/// 单个上传文件的输出位置
///
/// 以 `car.jpg` 为例：目录 `<root>/car/`，标注结果 `output_car.jpg`，
/// 识别文本 `text_car.jpg.txt`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  pub directory: PathBuf,
  pub annotated: PathBuf,
  pub transcript: PathBuf,
}

impl OutputLayout {
  pub fn new(root: &Path, input: &Path) -> Self {
    let stem = input
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_default();
    let file_name = input
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    let directory = root.join(stem);
    Self {
      annotated: directory.join(format!("output_{}", file_name)),
      transcript: directory.join(format!("text_{}.txt", file_name)),
      directory,
    }
  }
}
