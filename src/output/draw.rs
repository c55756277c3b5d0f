// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;

use crate::detector::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_PADDING: u32 = 2;
const BOX_THICKNESS: u32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];

#[derive(Error, Debug)]
pub enum AnnotatorError {
  #[error("读取字体文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效")]
  InvalidFont,
}

/// 标签相对检测框的位置
#[derive(Debug, Clone, Copy)]
enum LabelAnchor {
  /// 贴在框的左上角上方
  Above { top: u32 },
  /// 贴在框的左下角下方
  Below { bottom: u32 },
}

/// 帧标注器，在帧的副本上绘制检测框、置信度与识别文本
///
/// 按检测顺序逐个绘制，后绘制的标签可能覆盖先前的标签。
pub struct Annotator {
  font: FontArc,
  font_size: f32,
  box_color: [u8; 3],
  label_text_color: [u8; 3],
  thickness: u32,
}

impl Default for Annotator {
  fn default() -> Self {
    let font_data: &'static [u8] = include_bytes!("../../assets/font.ttf"); // default font
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");
    Self::with_font(font)
  }
}

impl Annotator {
  pub fn with_font(font: FontArc) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      label_text_color: LABEL_TEXT_COLOR,
      thickness: BOX_THICKNESS,
    }
  }

  pub fn from_font_file(path: &Path) -> Result<Self, AnnotatorError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|_| AnnotatorError::InvalidFont)?;
    Ok(Self::with_font(font))
  }

  /// 返回标注后的新图像，`detections` 与 `texts` 按位置一一对应
  pub fn annotate(&self, frame: &RgbImage, detections: &[Detection], texts: &[String]) -> RgbImage {
    debug_assert_eq!(detections.len(), texts.len());

    let mut image = frame.clone();
    if image.width() == 0 || image.height() == 0 {
      return image;
    }

    for (detection, text) in detections.iter().zip(texts) {
      self.draw_detection(&mut image, detection, text);
    }
    image
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection, text: &str) {
    let bbox = detection.bbox;
    let confidence = format!("{:.2}%", detection.confidence * 100.0);

    // 先画标签再画边框，边框不会被自身的标签遮住
    self.draw_label(image, &confidence, bbox.x1, LabelAnchor::Above { top: bbox.y1 });
    if !text.is_empty() {
      self.draw_label(image, text, bbox.x1, LabelAnchor::Below { bottom: bbox.y2 });
    }
    self.draw_box(image, detection);
  }

  fn draw_box(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width(), image.height());
    let bbox = detection.bbox;

    let x_min = bbox.x1.min(w - 1);
    let y_min = bbox.y1.min(h - 1);
    let x_max = bbox.x2.clamp(x_min, w - 1);
    let y_max = bbox.y2.clamp(y_min, h - 1);

    for t in 0..self.thickness {
      let (left, top) = (x_min + t, y_min + t);
      let (right, bottom) = (x_max.saturating_sub(t), y_max.saturating_sub(t));
      if left > right || top > bottom {
        break;
      }
      let rect = Rect::at(left as i32, top as i32).of_size(right - left + 1, bottom - top + 1);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }

  fn draw_label(&self, image: &mut RgbImage, label: &str, x: u32, anchor: LabelAnchor) {
    let (w, h) = (image.width(), image.height());
    let scale = PxScale::from(self.font_size);

    let (text_width, _) = text_size(scale, &self.font, label);
    let label_height = self.font_size.ceil() as u32 + 2 * LABEL_PADDING;
    let label_width = text_width + 2 * LABEL_PADDING;

    let label_x = x.min(w - 1);
    let label_y = match anchor {
      LabelAnchor::Above { top } => top.saturating_sub(label_height),
      LabelAnchor::Below { bottom } => (bottom + 1).min(h.saturating_sub(label_height)),
    };

    // 确保标签不超出图像边界
    let label_width = label_width.min(w - label_x);
    let label_height = label_height.min(h - label_y.min(h - 1));
    if label_width == 0 || label_height == 0 {
      return;
    }

    let rect = Rect::at(label_x as i32, label_y as i32).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, Rgb(self.box_color));
    draw_text_mut(
      image,
      Rgb(self.label_text_color),
      (label_x + LABEL_PADDING) as i32,
      (label_y + LABEL_PADDING) as i32,
      scale,
      &self.font,
      label,
    );
  }
}
