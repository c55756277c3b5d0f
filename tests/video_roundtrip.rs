// 该文件是 Paizhao （牌照识读） 项目的一部分。
// tests/video_roundtrip.rs - 视频任务端到端测试（需要 ffmpeg）
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
  path::{Path, PathBuf},
  process::{Command, Stdio},
  sync::atomic::{AtomicUsize, Ordering},
};

use image::RgbImage;
use paizhao::{
  CancellationToken, Pipeline, PipelineError, PipelineOptions,
  detector::{BoundingBox, Detect, Detection, DetectionError},
  input::{FrameRate, probe_video},
  ocr::{ExtractionError, Recognize, TextExtractor},
  output::draw::Annotator,
  task::process_media,
};

const FRAMES: u64 = 10;

fn tool_available(tool: &str) -> bool {
  Command::new(tool)
    .arg("-version")
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status()
    .map(|status| status.success())
    .unwrap_or(false)
}

/// 生成测试视频，环境缺少 ffmpeg 或 lavfi 时返回 `None`
fn synthetic_video(dir: &Path, name: &str) -> Option<PathBuf> {
  if !tool_available("ffmpeg") || !tool_available("ffprobe") {
    eprintln!("ffmpeg/ffprobe 不可用，跳过测试");
    return None;
  }
  let path = dir.join(name);
  let status = Command::new("ffmpeg")
    .args(["-y", "-loglevel", "error", "-f", "lavfi"])
    .args(["-i", "testsrc=size=96x64:rate=25"])
    .arg("-frames:v")
    .arg(FRAMES.to_string())
    .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
    .arg(&path)
    .status()
    .ok()?;
  if !status.success() {
    eprintln!("无法生成测试视频，跳过测试");
    return None;
  }
  Some(path)
}

/// 第 `fail_at` 次调用时失败，其余每帧返回同一个检测框
struct CountingDetector {
  calls: AtomicUsize,
  fail_at: Option<usize>,
}

impl CountingDetector {
  fn new(fail_at: Option<usize>) -> Self {
    Self {
      calls: AtomicUsize::new(0),
      fail_at,
    }
  }
}

impl Detect for CountingDetector {
  fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_at == Some(call) {
      return Err(DetectionError::Inference("model crashed".into()));
    }
    Ok(vec![Detection::new(BoundingBox::new(8, 8, 48, 32), 0.9)])
  }
}

struct StubOcr;

impl Recognize for StubOcr {
  fn recognize(&self, _crop: &RgbImage) -> Result<String, ExtractionError> {
    Ok("XYZ789".to_string())
  }
}

fn pipeline(fail_at: Option<usize>) -> Pipeline<CountingDetector, StubOcr> {
  Pipeline::new(
    CountingDetector::new(fail_at),
    TextExtractor::new(StubOcr),
    Annotator::default(),
  )
}

#[test]
fn annotated_video_keeps_geometry_rate_and_frame_count() {
  let dir = tempfile::tempdir().expect("tempdir");
  let Some(input) = synthetic_video(dir.path(), "clip.mp4") else {
    return;
  };
  let output_root = dir.path().join("temp");

  let processed = process_media(
    &pipeline(None),
    &input,
    &output_root,
    &CancellationToken::new(),
    &PipelineOptions { workers: 3 },
  )
  .expect("process");

  assert_eq!(processed.frames, FRAMES);
  assert_eq!(processed.transcript.len(), FRAMES as usize);

  let output = output_root.join("clip").join("output_clip.mp4");
  let info = probe_video(&output).expect("probe output");
  assert_eq!((info.width, info.height), (96, 64));
  assert_eq!(info.frame_rate, FrameRate::new(25, 1).expect("rate"));
  if let Some(count) = info.frame_count {
    assert_eq!(count, FRAMES);
  }

  let text = std::fs::read_to_string(output_root.join("clip").join("text_clip.mp4.txt"))
    .expect("transcript");
  assert_eq!(text, "XYZ789\n".repeat(FRAMES as usize));
}

#[test]
fn failing_frame_discards_the_partial_video() {
  let dir = tempfile::tempdir().expect("tempdir");
  let Some(input) = synthetic_video(dir.path(), "clip.mkv") else {
    return;
  };
  let output_root = dir.path().join("temp");

  let err = process_media(
    &pipeline(Some(4)),
    &input,
    &output_root,
    &CancellationToken::new(),
    &PipelineOptions::default(),
  )
  .expect_err("must fail");

  assert!(matches!(err, PipelineError::Detection { frame_index: 4, .. }));
  let directory = output_root.join("clip");
  let leftovers: Vec<_> = std::fs::read_dir(&directory)
    .expect("read_dir")
    .filter_map(|entry| entry.ok())
    .map(|entry| entry.file_name())
    .collect();
  assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}
