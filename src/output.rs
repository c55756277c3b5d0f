// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbImage;

use crate::input::VideoError;

/// 按顺序接收标注后视频帧的输出
///
/// 未调用 [`FrameSink::finish`] 就被销毁时，输出不应留下任何半成品。
pub trait FrameSink {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), VideoError>;

  fn finish(self) -> Result<(), VideoError>
  where
    Self: Sized;

  /// 输出位置，用于错误报告
  fn path(&self) -> &Path;
}

pub mod draw;
pub mod transcript;

mod save_image_file;
pub use self::save_image_file::save_image_file;

mod save_video_file;
pub use self::save_video_file::{SaveVideoFileOutput, VIDEO_CODEC};

/// 与目标文件同目录的隐藏临时文件，完成后原子替换目标
pub(crate) fn partial_path(path: &Path) -> PathBuf {
  let name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  path.with_file_name(format!(".{}.part", name))
}
