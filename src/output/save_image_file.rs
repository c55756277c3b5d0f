// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::Path;

use image::{ImageError, ImageFormat, ImageResult, RgbImage};
use tracing::{info, warn};

use super::partial_path;

/// 按扩展名对应的格式保存图像，已存在的文件会被覆盖
///
/// 先写入同目录的临时文件再重命名，失败时目标路径不会出现残缺文件。
pub fn save_image_file(image: &RgbImage, path: &Path) -> ImageResult<()> {
  let format = ImageFormat::from_path(path)?;
  let partial = partial_path(path);

  if let Err(e) = image.save_with_format(&partial, format) {
    if let Err(e) = std::fs::remove_file(&partial) {
      warn!("清理临时文件失败 {}: {}", partial.display(), e);
    }
    return Err(e);
  }
  std::fs::rename(&partial, path).map_err(ImageError::IoError)?;

  info!(
    "保存图像 {}: {}x{}",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(())
}
