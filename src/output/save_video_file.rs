// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/output/save_video_file.rs - 保存视频文件
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

//! 视频文件输出模块
//!
//! 标注后的帧以 RGB24 原始数据经管道写入 `ffmpeg`，按固定编码器重新编码，
//! 尺寸与帧率和输入保持一致。编码结果先写入同目录的隐藏临时文件，
//! 调用 [`FrameSink::finish`] 成功后才重命名为目标文件。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 命令行工具来编码视频。

use std::{
  io::{Read, Write},
  path::{Path, PathBuf},
  process::{Child, ChildStdin, Command, Stdio},
  thread::JoinHandle,
};

use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::{
  input::{FrameRate, VideoError},
  output::{FrameSink, partial_path},
};

/// 输出视频使用的编码器
pub const VIDEO_CODEC: &str = "mpeg4";

/// 根据扩展名选择封装格式
fn muxer_for(path: &Path) -> Option<&'static str> {
  let extension = path.extension()?.to_str()?.to_ascii_lowercase();
  match extension.as_str() {
    "mp4" => Some("mp4"),
    "avi" => Some("avi"),
    "mov" => Some("mov"),
    "mkv" => Some("matroska"),
    _ => None,
  }
}

/// ffmpeg 编码进程，未完成时销毁会终止进程并删除临时文件
pub struct SaveVideoFileOutput {
  path: PathBuf,
  partial: PathBuf,
  width: u32,
  height: u32,
  child: Child,
  stdin: Option<ChildStdin>,
  stderr: Option<JoinHandle<String>>,
  frames: u64,
  finished: bool,
}

impl SaveVideoFileOutput {
  pub fn create(
    path: &Path,
    width: u32,
    height: u32,
    frame_rate: FrameRate,
  ) -> Result<Self, VideoError> {
    let muxer = muxer_for(path).ok_or_else(|| {
      VideoError::InvalidMetadata(format!("无法确定输出容器: {}", path.display()))
    })?;
    let partial = partial_path(path);

    info!(
      "开始编码视频: {}x{} @ {} fps, {} -> {}",
      width,
      height,
      frame_rate,
      VIDEO_CODEC,
      path.display()
    );

    let mut child = Command::new("ffmpeg")
      .arg("-y") // 覆盖已存在的文件
      .args(["-loglevel", "error", "-nostdin"])
      .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
      .arg("-s")
      .arg(format!("{}x{}", width, height))
      .arg("-framerate")
      .arg(frame_rate.to_string())
      .args(["-i", "-"])
      .args(["-c:v", VIDEO_CODEC, "-q:v", "2"])
      .args(["-pix_fmt", "yuv420p"]) // 兼容性格式
      .arg("-r")
      .arg(frame_rate.to_string())
      .args(["-f", muxer])
      .arg(&partial)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| VideoError::ToolMissing {
        tool: "ffmpeg",
        source,
      })?;

    let stdin = child.stdin.take();
    let stderr = child.stderr.take().map(|mut stderr| {
      std::thread::spawn(move || {
        let mut message = String::new();
        let _ = stderr.read_to_string(&mut message);
        message
      })
    });

    Ok(Self {
      path: path.to_path_buf(),
      partial,
      width,
      height,
      child,
      stdin,
      stderr,
      frames: 0,
      finished: false,
    })
  }

  fn take_stderr(&mut self) -> String {
    self
      .stderr
      .take()
      .and_then(|handle| handle.join().ok())
      .map(|message| message.trim().to_string())
      .unwrap_or_default()
  }
}

impl FrameSink for SaveVideoFileOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), VideoError> {
    if image.dimensions() != (self.width, self.height) {
      return Err(VideoError::DimensionMismatch {
        expected: (self.width, self.height),
        actual: image.dimensions(),
      });
    }
    let stdin = self.stdin.as_mut().ok_or(VideoError::EncoderClosed)?;

    if let Err(e) = stdin.write_all(image.as_raw()) {
      // 编码进程提前退出时，stderr 比管道错误更能说明原因
      self.stdin = None;
      let _ = self.child.wait();
      let stderr = self.take_stderr();
      error!("写入第 {} 帧失败: {}", self.frames, e);
      return Err(if stderr.is_empty() {
        VideoError::Io(e)
      } else {
        VideoError::ToolFailed {
          tool: "ffmpeg",
          stderr,
        }
      });
    }

    self.frames += 1;
    Ok(())
  }

  fn finish(mut self) -> Result<(), VideoError> {
    let mut stdin = self.stdin.take().ok_or(VideoError::EncoderClosed)?;
    stdin.flush()?;
    drop(stdin);

    let status = self.child.wait()?;
    let stderr = self.take_stderr();
    if !status.success() {
      error!("ffmpeg 错误: {}", stderr);
      return Err(VideoError::ToolFailed {
        tool: "ffmpeg",
        stderr,
      });
    }

    std::fs::rename(&self.partial, &self.path)?;
    self.finished = true;
    info!("视频编码成功: {} ({} 帧)", self.path.display(), self.frames);
    Ok(())
  }

  fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for SaveVideoFileOutput {
  fn drop(&mut self) {
    if self.finished {
      return;
    }

    self.stdin = None;
    if let Ok(None) = self.child.try_wait() {
      warn!("放弃未完成的视频: {}", self.path.display());
      let _ = self.child.kill();
    }
    let _ = self.child.wait();
    let _ = self.take_stderr();

    if self.partial.exists() {
      match std::fs::remove_file(&self.partial) {
        Ok(()) => debug!("已删除临时文件 {}", self.partial.display()),
        Err(e) => warn!("清理临时文件失败 {}: {}", self.partial.display(), e),
      }
    }
  }
}
