// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/model/yolo.rs - ONNX YOLO 车牌检测模型
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

//! ONNX 格式的 YOLO 检测模型
//!
//! 支持 Ultralytics 导出的两种输出布局：
//!
//! - `[1, 4 + nc, N]`：逐锚点输出 `cx, cy, w, h` 与各类别分数，需要 NMS；
//! - `[1, N, 6]`：端到端输出 `x1, y1, x2, y2, score, class`，已完成 NMS。
//!
//! # URL 格式
//!
//! - `yolo:///path/to/best.onnx` - 默认输入 640，置信度 0.25，IoU 0.45
//! - `yolo:///path/to/best.onnx?conf=0.4&iou=0.5&size=640`

use std::{path::PathBuf, sync::Arc};

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use ndarray::{Array4, CowArray, IxDyn};
use ort::{
  environment::Environment,
  session::{Session, SessionBuilder},
  value::Value,
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Model},
  url_path, url_query,
};

const YOLO_SCHEME: &str = "yolo";
const YOLO_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLO_DEFAULT_CONFIDENCE: f32 = 0.25;
const YOLO_DEFAULT_IOU: f32 = 0.45;
const YOLO_PAD_VALUE: u8 = 114;
const YOLO_END2END_ROW: usize = 6;

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型文件不存在: {}", .0.display())]
  ModelNotFound(PathBuf),
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("ONNX Runtime 初始化失败: {0}")]
  Environment(String),
  #[error("模型加载失败: {0}")]
  Session(String),
  #[error("模型推理失败: {0}")]
  Inference(String),
  #[error("模型输出形状无法识别: {0:?}")]
  UnexpectedOutput(Vec<usize>),
}

pub struct YoloOnnxBuilder {
  model_path: PathBuf,
  input_size: u32,
  confidence_threshold: f32,
  iou_threshold: f32,
}

impl FromUrlWithScheme for YoloOnnxBuilder {
  const SCHEME: &'static str = YOLO_SCHEME;
}

impl FromUrl for YoloOnnxBuilder {
  type Error = YoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloError::SchemeMismatch(Self::SCHEME.to_string()));
    }

    YoloOnnxBuilder::new(url_path(url))
      .input_size(url_query(url, "size").unwrap_or(YOLO_DEFAULT_INPUT_SIZE))
      .confidence_threshold(url_query(url, "conf").unwrap_or(YOLO_DEFAULT_CONFIDENCE))
      .iou_threshold(url_query(url, "iou").unwrap_or(YOLO_DEFAULT_IOU))
      .validate()
  }
}

impl YoloOnnxBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: YOLO_DEFAULT_INPUT_SIZE,
      confidence_threshold: YOLO_DEFAULT_CONFIDENCE,
      iou_threshold: YOLO_DEFAULT_IOU,
    }
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  fn validate(self) -> Result<Self, YoloError> {
    if self.input_size == 0 || self.input_size % 32 != 0 {
      return Err(YoloError::InvalidParameter(format!(
        "输入尺寸 {} 必须是 32 的正整数倍",
        self.input_size
      )));
    }
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(YoloError::InvalidParameter(format!(
        "置信度阈值 {} 超出范围 [0, 1]",
        self.confidence_threshold
      )));
    }
    if !(0.0..=1.0).contains(&self.iou_threshold) {
      return Err(YoloError::InvalidParameter(format!(
        "IoU 阈值 {} 超出范围 [0, 1]",
        self.iou_threshold
      )));
    }
    Ok(self)
  }

  pub fn build(self) -> Result<YoloOnnx, YoloError> {
    let builder = self.validate()?;
    if !builder.model_path.exists() {
      return Err(YoloError::ModelNotFound(builder.model_path));
    }

    info!("加载模型文件: {}", builder.model_path.display());
    let environment = Environment::builder()
      .with_name("paizhao")
      .build()
      .map_err(|e| YoloError::Environment(e.to_string()))?;
    let environment = Arc::new(environment);

    let session = SessionBuilder::new(&environment)
      .map_err(|e| YoloError::Session(e.to_string()))?
      .with_model_from_file(&builder.model_path)
      .map_err(|e| YoloError::Session(e.to_string()))?;
    info!("模型加载完成");
    debug!(
      "输入尺寸: {}, 置信度阈值: {}, IoU 阈值: {}",
      builder.input_size, builder.confidence_threshold, builder.iou_threshold
    );

    Ok(YoloOnnx {
      _environment: environment,
      session,
      input_size: builder.input_size,
      confidence_threshold: builder.confidence_threshold,
      iou_threshold: builder.iou_threshold,
    })
  }
}

/// ONNX YOLO 检测器，加载后只读
pub struct YoloOnnx {
  _environment: Arc<Environment>,
  session: Session,
  input_size: u32,
  confidence_threshold: f32,
  iou_threshold: f32,
}

impl YoloOnnx {
  fn run_model(&self, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>), YoloError> {
    let session = &self.session;
    let allocator = session.allocator();
    let input_dyn: CowArray<'_, f32, IxDyn> = CowArray::from(input.view().into_dyn());
    let value =
      Value::from_array(allocator, &input_dyn).map_err(|e| YoloError::Inference(e.to_string()))?;
    let outputs = session
      .run(vec![value])
      .map_err(|e| YoloError::Inference(e.to_string()))?;
    let tensor = outputs
      .into_iter()
      .next()
      .ok_or_else(|| YoloError::UnexpectedOutput(Vec::new()))?
      .try_extract::<f32>()
      .map_err(|e| YoloError::Inference(e.to_string()))?;
    let view = tensor.view();
    let shape = view.shape().to_vec();
    let data = view.iter().copied().collect::<Vec<f32>>();
    Ok((data, shape))
  }
}

impl Model for YoloOnnx {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = YoloError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("预处理输入帧 {}x{}", input.width(), input.height());
    let (canvas, letterbox) = letterbox(input, self.input_size);
    let tensor = to_nchw_tensor(&canvas);

    debug!("执行模型推理");
    let (data, shape) = self.run_model(&tensor)?;
    debug!("模型输出形状: {:?}", shape);

    let items = decode_output(
      &data,
      &shape,
      &letterbox,
      self.confidence_threshold,
      self.iou_threshold,
    )?;
    debug!("检测到 {} 个目标", items.len());

    Ok(DetectResult::from(items))
  }
}

/// 信箱缩放参数，用于把模型坐标还原到原始帧
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
  width: f32,
  height: f32,
}

impl Letterbox {
  /// 模型输入坐标 -> 原始帧归一化坐标
  fn restore(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> [f32; 4] {
    [
      (x1 - self.pad_x) / self.scale / self.width,
      (y1 - self.pad_y) / self.scale / self.height,
      (x2 - self.pad_x) / self.scale / self.width,
      (y2 - self.pad_y) / self.scale / self.height,
    ]
  }
}

fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
  let (width, height) = image.dimensions();
  let scale = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
  let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
  let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);

  let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
  let mut canvas = RgbImage::from_pixel(size, size, Rgb([YOLO_PAD_VALUE; 3]));
  let pad_x = (size - new_w) / 2;
  let pad_y = (size - new_h) / 2;
  imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

  (
    canvas,
    Letterbox {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
      width: width.max(1) as f32,
      height: height.max(1) as f32,
    },
  )
}

fn to_nchw_tensor(image: &RgbImage) -> Array4<f32> {
  let (width, height) = image.dimensions();
  let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
  for (x, y, pixel) in image.enumerate_pixels() {
    for c in 0..3 {
      tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
    }
  }
  tensor
}

fn decode_output(
  data: &[f32],
  shape: &[usize],
  letterbox: &Letterbox,
  confidence_threshold: f32,
  iou_threshold: f32,
) -> Result<Vec<DetectItem>, YoloError> {
  match *shape {
    [1, rows, YOLO_END2END_ROW] if rows != YOLO_END2END_ROW => {
      Ok(decode_end2end(data, rows, letterbox, confidence_threshold))
    }
    [1, channels, anchors] if channels > 4 && data.len() == channels * anchors => {
      let candidates = decode_anchors(data, channels, anchors, letterbox, confidence_threshold);
      Ok(nms(candidates, iou_threshold))
    }
    _ => Err(YoloError::UnexpectedOutput(shape.to_vec())),
  }
}

fn decode_end2end(
  data: &[f32],
  rows: usize,
  letterbox: &Letterbox,
  confidence_threshold: f32,
) -> Vec<DetectItem> {
  data
    .chunks_exact(YOLO_END2END_ROW)
    .take(rows)
    .filter(|row| row[4] >= confidence_threshold)
    .map(|row| DetectItem {
      class_id: row[5].max(0.0) as u32,
      score: row[4],
      bbox: letterbox.restore(row[0], row[1], row[2], row[3]),
    })
    .collect()
}

fn decode_anchors(
  data: &[f32],
  channels: usize,
  anchors: usize,
  letterbox: &Letterbox,
  confidence_threshold: f32,
) -> Vec<DetectItem> {
  let num_classes = channels - 4;
  let mut items = Vec::new();

  for i in 0..anchors {
    let (score, class_id) = (0..num_classes)
      .map(|c| (data[(4 + c) * anchors + i], c as u32))
      .fold((f32::MIN, 0u32), |best, cur| if cur.0 > best.0 { cur } else { best });

    if score < confidence_threshold {
      continue;
    }

    let cx = data[i];
    let cy = data[anchors + i];
    let w = data[2 * anchors + i];
    let h = data[3 * anchors + i];

    items.push(DetectItem {
      class_id,
      score,
      bbox: letterbox.restore(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
    });
  }

  items
}

/// 非极大值抑制，结果按置信度降序
fn nms(mut detections: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();
  for det in detections {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == det.class_id && iou(&kept.bbox, &det.bbox) >= iou_threshold);
    if !suppressed {
      result.push(det);
    }
  }

  result
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity_letterbox(size: f32) -> Letterbox {
    Letterbox {
      scale: 1.0,
      pad_x: 0.0,
      pad_y: 0.0,
      width: size,
      height: size,
    }
  }

  #[test]
  fn letterbox_pads_wide_frame_vertically() {
    let image = RgbImage::new(1280, 640);
    let (canvas, lb) = letterbox(&image, 640);
    assert_eq!(canvas.dimensions(), (640, 640));
    assert_eq!(lb.scale, 0.5);
    assert_eq!(lb.pad_x, 0.0);
    assert_eq!(lb.pad_y, 160.0);
    assert_eq!(canvas.get_pixel(0, 0), &Rgb([YOLO_PAD_VALUE; 3]));

    // 模型空间中填充区域内的框映射回原图后落在 [0, 1] 之内
    let bbox = lb.restore(0.0, 160.0, 640.0, 480.0);
    assert_eq!(bbox, [0.0, 0.0, 1.0, 1.0]);
  }

  #[test]
  fn anchor_output_is_thresholded_and_suppressed() {
    // 单类别，4 个锚点：两个高度重叠，一个低分，一个独立
    let anchors = 4;
    #[rustfmt::skip]
    let data = vec![
      // cx
      50.0, 52.0, 10.0, 300.0,
      // cy
      50.0, 50.0, 10.0, 300.0,
      // w
      40.0, 40.0, 10.0, 20.0,
      // h
      20.0, 20.0, 10.0, 20.0,
      // score
      0.9, 0.8, 0.1, 0.6,
    ];
    let items = decode_output(&data, &[1, 5, anchors], &identity_letterbox(640.0), 0.25, 0.45)
      .expect("decode");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].score, 0.9);
    assert_eq!(items[1].score, 0.6);
    let expected = [30.0 / 640.0, 40.0 / 640.0, 70.0 / 640.0, 60.0 / 640.0];
    for (got, want) in items[0].bbox.iter().zip(expected) {
      assert!((got - want).abs() < 1e-6);
    }
  }

  #[test]
  fn end2end_output_keeps_model_order() {
    #[rustfmt::skip]
    let data = vec![
      10.0, 10.0, 50.0, 50.0, 0.7, 0.0,
      60.0, 60.0, 90.0, 80.0, 0.9, 0.0,
      0.0, 0.0, 5.0, 5.0, 0.1, 0.0,
    ];
    let items = decode_output(&data, &[1, 3, 6], &identity_letterbox(100.0), 0.25, 0.45)
      .expect("decode");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].bbox, [0.1, 0.1, 0.5, 0.5]);
    assert_eq!(items[1].score, 0.9);
  }

  #[test]
  fn unknown_output_shape_is_rejected() {
    let err = decode_output(&[0.0; 8], &[2, 4], &identity_letterbox(1.0), 0.5, 0.5);
    assert!(matches!(err, Err(YoloError::UnexpectedOutput(_))));
  }

  #[test]
  fn builder_from_url_reads_query() {
    let url = Url::parse("yolo:///models/plate%20v2.onnx?conf=0.4&iou=0.5&size=320").expect("url");
    let builder = YoloOnnxBuilder::from_url(&url).expect("builder");
    assert_eq!(builder.model_path, PathBuf::from("/models/plate v2.onnx"));
    assert_eq!(builder.input_size, 320);
    assert_eq!(builder.confidence_threshold, 0.4);
    assert_eq!(builder.iou_threshold, 0.5);
  }

  #[test]
  fn builder_rejects_bad_scheme_and_parameters() {
    let url = Url::parse("rknn:///models/best.onnx").expect("url");
    assert!(matches!(
      YoloOnnxBuilder::from_url(&url),
      Err(YoloError::SchemeMismatch(_))
    ));

    let url = Url::parse("yolo:///models/best.onnx?conf=1.5").expect("url");
    assert!(matches!(
      YoloOnnxBuilder::from_url(&url),
      Err(YoloError::InvalidParameter(_))
    ));
  }

  #[test]
  fn missing_model_file_fails_before_runtime_init() {
    let err = YoloOnnxBuilder::new("/nonexistent/best.onnx").build();
    assert!(matches!(err, Err(YoloError::ModelNotFound(_))));
  }
}
