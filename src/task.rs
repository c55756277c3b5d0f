// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/task.rs - 单个媒体文件的处理任务
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

use tracing::{info, warn};

use crate::{
  cancel::CancellationToken,
  detector::Detect,
  error::{PipelineError, Stage},
  input::{FrameSource, VideoFileInput, read_image_file},
  media::{MediaKind, OutputLayout, classify},
  ocr::Recognize,
  output::{SaveVideoFileOutput, save_image_file, transcript::Transcript},
  pipeline::{Pipeline, PipelineOptions},
};

/// 一次处理的产物
#[derive(Debug, Clone)]
pub struct ProcessedMedia {
  pub kind: MediaKind,
  pub layout: OutputLayout,
  pub frames: u64,
  pub detections: usize,
  pub transcript: Transcript,
}

/// 处理一个上传文件：分派 → 流水线 → 写出标注结果与识别文本
///
/// 扩展名不受支持时直接返回，不会创建任何目录或文件。
/// 识别文本写入失败时删除已写出的标注文件，两个产物要么都存在要么都不存在。
pub fn process_media<D, R>(
  pipeline: &Pipeline<D, R>,
  input: &Path,
  output_root: &Path,
  cancel: &CancellationToken,
  options: &PipelineOptions,
) -> Result<ProcessedMedia, PipelineError>
where
  D: Detect + Sync,
  R: Recognize + Sync,
{
  let kind = classify(input)?;
  let layout = OutputLayout::new(output_root, input);
  info!("开始任务: {} ({:?})", input.display(), kind);

  std::fs::create_dir_all(&layout.directory)
    .map_err(|e| PipelineError::io(Stage::Write, &layout.directory, e))?;

  let processed = match kind {
    MediaKind::Image => process_image_file(pipeline, input, layout)?,
    MediaKind::Video => process_video_file(pipeline, input, layout, cancel, options)?,
  };

  if let Err(e) = processed.transcript.write_to(&processed.layout.transcript) {
    let annotated = &processed.layout.annotated;
    if let Err(remove) = std::fs::remove_file(annotated) {
      warn!("删除标注文件失败 {}: {}", annotated.display(), remove);
    }
    return Err(PipelineError::io(
      Stage::Write,
      &processed.layout.transcript,
      e,
    ));
  }

  info!(
    "任务完成: {} -> {}",
    input.display(),
    processed.layout.directory.display()
  );
  Ok(processed)
}

fn process_image_file<D: Detect, R: Recognize>(
  pipeline: &Pipeline<D, R>,
  input: &Path,
  layout: OutputLayout,
) -> Result<ProcessedMedia, PipelineError> {
  let image = read_image_file(input).map_err(|e| PipelineError::io(Stage::Load, input, e))?;
  let (annotated, transcript) = pipeline.process_image(&image)?;

  save_image_file(&annotated, &layout.annotated)
    .map_err(|e| PipelineError::io(Stage::Write, &layout.annotated, e))?;

  Ok(ProcessedMedia {
    kind: MediaKind::Image,
    layout,
    frames: 1,
    detections: transcript.len(),
    transcript,
  })
}

fn process_video_file<D, R>(
  pipeline: &Pipeline<D, R>,
  input: &Path,
  layout: OutputLayout,
  cancel: &CancellationToken,
  options: &PipelineOptions,
) -> Result<ProcessedMedia, PipelineError>
where
  D: Detect + Sync,
  R: Recognize + Sync,
{
  let source = VideoFileInput::open(input).map_err(|e| PipelineError::io(Stage::Load, input, e))?;
  let info = source.info();
  let sink = SaveVideoFileOutput::create(&layout.annotated, info.width, info.height, info.frame_rate)
    .map_err(|e| PipelineError::io(Stage::Write, &layout.annotated, e))?;

  let summary = pipeline.process_video(source, sink, cancel, options)?;

  Ok(ProcessedMedia {
    kind: MediaKind::Video,
    layout,
    frames: summary.frames,
    detections: summary.detections,
    transcript: summary.transcript,
  })
}
