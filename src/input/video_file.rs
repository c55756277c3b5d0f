// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/input/video_file.rs - 视频文件输入
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

//! 视频文件输入模块
//!
//! 用 `ffprobe` 读取视频流参数，再由 `ffmpeg` 把视频解码为 RGB24 原始帧，
//! 经标准输出逐帧读取。帧按解码顺序产出，不丢帧也不补帧。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 与 ffprobe 命令行工具。

use std::{
  io::{ErrorKind, Read},
  path::{Path, PathBuf},
  process::{Child, ChildStdout, Command, Stdio},
  thread::JoinHandle,
};

use image::RgbImage;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  frame::Frame,
  input::{FrameRate, FrameSource, VideoError, VideoInfo},
};

const RGB_CHANNELS: usize = 3;

/// 读取视频第一条视频流的参数
pub fn probe_video(path: &Path) -> Result<VideoInfo, VideoError> {
  let output = Command::new("ffprobe")
    .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
    .arg("stream=width,height,r_frame_rate,avg_frame_rate,nb_frames")
    .args(["-print_format", "json"])
    .arg(path)
    .stdin(Stdio::null())
    .output()
    .map_err(|source| VideoError::ToolMissing {
      tool: "ffprobe",
      source,
    })?;

  if !output.status.success() {
    return Err(VideoError::ToolFailed {
      tool: "ffprobe",
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }

  parse_probe(&output.stdout)
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo, VideoError> {
  let value: Value =
    serde_json::from_slice(json).map_err(|e| VideoError::InvalidMetadata(e.to_string()))?;
  let stream = value
    .get("streams")
    .and_then(|streams| streams.get(0))
    .ok_or_else(|| VideoError::InvalidMetadata("找不到视频流".to_string()))?;

  let dimension = |key: &str| {
    stream
      .get(key)
      .and_then(Value::as_u64)
      .filter(|v| *v > 0 && *v <= u32::MAX as u64)
      .map(|v| v as u32)
      .ok_or_else(|| VideoError::InvalidMetadata(format!("缺少有效的 {}", key)))
  };
  let width = dimension("width")?;
  let height = dimension("height")?;

  // 可变帧率的素材中 r_frame_rate 常是时间基的猜测值（如 90000/1），以平均帧率为准
  let frame_rate = ["avg_frame_rate", "r_frame_rate"]
    .iter()
    .filter_map(|key| stream.get(*key).and_then(Value::as_str))
    .find_map(|rate| rate.parse::<FrameRate>().ok())
    .ok_or_else(|| VideoError::InvalidMetadata("缺少有效的帧率".to_string()))?;

  let frame_count = stream
    .get("nb_frames")
    .and_then(Value::as_str)
    .and_then(|count| count.parse::<u64>().ok());

  Ok(VideoInfo {
    width,
    height,
    frame_rate,
    frame_count,
  })
}

/// ffmpeg 解码的视频源，解码进程在销毁时回收
pub struct VideoFileInput {
  path: PathBuf,
  info: VideoInfo,
  child: Child,
  stdout: ChildStdout,
  stderr: Option<JoinHandle<String>>,
  frame_index: u64,
  finished: bool,
}

impl VideoFileInput {
  pub fn open(path: &Path) -> Result<Self, VideoError> {
    let info = probe_video(path)?;
    info!(
      "打开视频 {}: {}x{} @ {} fps, 帧数 {:?}",
      path.display(),
      info.width,
      info.height,
      info.frame_rate,
      info.frame_count
    );

    let mut child = Command::new("ffmpeg")
      .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
      .arg(path)
      .args(["-map", "0:v:0", "-an", "-sn", "-vsync", "passthrough"])
      .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| VideoError::ToolMissing {
        tool: "ffmpeg",
        source,
      })?;

    let stdout = child
      .stdout
      .take()
      .ok_or_else(|| VideoError::Io(std::io::Error::other("无法获取 ffmpeg 标准输出")))?;
    let stderr = child.stderr.take().map(|mut stderr| {
      std::thread::spawn(move || {
        let mut message = String::new();
        let _ = stderr.read_to_string(&mut message);
        message
      })
    });

    Ok(Self {
      path: path.to_path_buf(),
      info,
      child,
      stdout,
      stderr,
      frame_index: 0,
      finished: false,
    })
  }

  fn frame_len(&self) -> usize {
    self.info.width as usize * self.info.height as usize * RGB_CHANNELS
  }

  /// 解码进程结束后检查退出状态
  fn finish_decoder(&mut self) -> Result<(), VideoError> {
    let status = self.child.wait()?;
    let stderr = self
      .stderr
      .take()
      .and_then(|handle| handle.join().ok())
      .unwrap_or_default();
    if status.success() {
      debug!("视频解码结束: {} 帧", self.frame_index);
      Ok(())
    } else {
      Err(VideoError::ToolFailed {
        tool: "ffmpeg",
        stderr: stderr.trim().to_string(),
      })
    }
  }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
  let mut filled = 0;
  while filled < buf.len() {
    match reader.read(&mut buf[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    }
  }
  Ok(filled)
}

impl Iterator for VideoFileInput {
  type Item = Result<Frame, VideoError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let expected = self.frame_len();
    let mut data = vec![0u8; expected];
    let filled = match read_full(&mut self.stdout, &mut data) {
      Ok(filled) => filled,
      Err(e) => {
        self.finished = true;
        return Some(Err(e.into()));
      }
    };

    if filled == 0 {
      self.finished = true;
      return self.finish_decoder().err().map(Err);
    }

    if filled < expected {
      self.finished = true;
      return Some(Err(VideoError::TruncatedFrame {
        index: self.frame_index,
        expected,
        actual: filled,
      }));
    }

    let image = match RgbImage::from_raw(self.info.width, self.info.height, data) {
      Some(image) => image,
      None => {
        self.finished = true;
        return Some(Err(VideoError::TruncatedFrame {
          index: self.frame_index,
          expected,
          actual: filled,
        }));
      }
    };

    let frame = Frame::new(self.frame_index, image);
    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl FrameSource for VideoFileInput {
  fn info(&self) -> VideoInfo {
    self.info
  }

  fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for VideoFileInput {
  fn drop(&mut self) {
    if let Ok(None) = self.child.try_wait() {
      warn!("提前结束视频解码: {}", self.path.display());
      let _ = self.child.kill();
    }
    let _ = self.child.wait();
  }
}
