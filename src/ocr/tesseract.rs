// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/ocr/tesseract.rs - Tesseract 命令行 OCR 引擎
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

//! Tesseract 命令行 OCR 引擎
//!
//! 每次识别启动一个 `tesseract stdin stdout` 进程，裁剪图像转为灰度 PNG 后写入标准输入。
//!
//! # URL 格式
//!
//! - `tesseract:` - 使用 `PATH` 中的 tesseract，单词模式（psm 8），英文
//! - `tesseract:///usr/local/bin/tesseract?psm=7&lang=eng&oem=1`
//! - `tesseract:?whitelist=ABCDEFGHJKLMNPRSTUVWXYZ0123456789`
//!
//! # 依赖
//!
//! 此模块需要系统安装 tesseract 命令行工具。

use std::{
  io::{self, Cursor, Write},
  process::{Command, Stdio},
};

use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  ocr::{ExtractionError, Recognize},
  url_path, url_query,
};

const TESSERACT_SCHEME: &str = "tesseract";
const TESSERACT_DEFAULT_BINARY: &str = "tesseract";
/// 把图像当作单个单词处理
const TESSERACT_PSM_SINGLE_WORD: u8 = 8;
const TESSERACT_MAX_PSM: u8 = 13;
const TESSERACT_DEFAULT_LANG: &str = "eng";

pub struct TesseractCliBuilder {
  binary: String,
  psm: u8,
  oem: Option<u8>,
  lang: String,
  whitelist: Option<String>,
}

impl Default for TesseractCliBuilder {
  fn default() -> Self {
    Self {
      binary: TESSERACT_DEFAULT_BINARY.to_string(),
      psm: TESSERACT_PSM_SINGLE_WORD,
      oem: None,
      lang: TESSERACT_DEFAULT_LANG.to_string(),
      whitelist: None,
    }
  }
}

impl FromUrlWithScheme for TesseractCliBuilder {
  const SCHEME: &'static str = TESSERACT_SCHEME;
}

impl FromUrl for TesseractCliBuilder {
  type Error = ExtractionError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ExtractionError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = TesseractCliBuilder::default();
    let path = url_path(url);
    if !path.is_empty() && path != "/" {
      builder = builder.binary(path);
    }
    if let Some(psm) = url_query(url, "psm") {
      builder = builder.psm(psm);
    }
    if let Some(oem) = url_query(url, "oem") {
      builder = builder.oem(oem);
    }
    if let Some(lang) = url_query::<String>(url, "lang") {
      builder = builder.lang(lang);
    }
    if let Some(whitelist) = url_query::<String>(url, "whitelist") {
      builder = builder.whitelist(whitelist);
    }
    Ok(builder)
  }
}

impl TesseractCliBuilder {
  pub fn binary(mut self, binary: impl Into<String>) -> Self {
    self.binary = binary.into();
    self
  }

  /// 页面分割模式，8 为单词，7 为单行
  pub fn psm(mut self, psm: u8) -> Self {
    self.psm = psm;
    self
  }

  pub fn oem(mut self, oem: u8) -> Self {
    self.oem = Some(oem);
    self
  }

  pub fn lang(mut self, lang: impl Into<String>) -> Self {
    self.lang = lang.into();
    self
  }

  pub fn whitelist(mut self, whitelist: impl Into<String>) -> Self {
    self.whitelist = Some(whitelist.into());
    self
  }

  pub fn build(self) -> Result<TesseractCli, ExtractionError> {
    if self.psm > TESSERACT_MAX_PSM {
      return Err(ExtractionError::InvalidParameter(format!(
        "psm {} 超出有效范围 [0, {}]",
        self.psm, TESSERACT_MAX_PSM
      )));
    }
    if self.lang.is_empty() {
      return Err(ExtractionError::InvalidParameter("语言不能为空".to_string()));
    }

    let mut args = vec![
      "stdin".to_string(),
      "stdout".to_string(),
      "--psm".to_string(),
      self.psm.to_string(),
      "-l".to_string(),
      self.lang,
    ];
    if let Some(oem) = self.oem {
      args.push("--oem".to_string());
      args.push(oem.to_string());
    }
    if let Some(whitelist) = self.whitelist {
      args.push("-c".to_string());
      args.push(format!("tessedit_char_whitelist={}", whitelist));
    }

    Ok(TesseractCli {
      binary: self.binary,
      args,
    })
  }
}

/// 调用 tesseract 命令行的 OCR 引擎，无内部状态
#[derive(Debug, Clone)]
pub struct TesseractCli {
  binary: String,
  args: Vec<String>,
}

impl TesseractCli {
  pub fn args(&self) -> &[String] {
    &self.args
  }

  fn encode_gray_png(crop: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
    let gray = DynamicImage::ImageRgb8(crop.clone()).into_luma8();
    let mut png = Cursor::new(Vec::new());
    gray.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
  }
}

impl Recognize for TesseractCli {
  fn recognize(&self, crop: &RgbImage) -> Result<String, ExtractionError> {
    let png = Self::encode_gray_png(crop)?;

    let mut child = Command::new(&self.binary)
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(ExtractionError::Spawn)?;

    // 写入线程负责标准输入，当前线程同时读取标准输出与标准错误
    let stdin = child.stdin.take();
    let (written, output) = std::thread::scope(|scope| {
      let writer = scope.spawn(move || match stdin {
        Some(mut stdin) => stdin.write_all(&png),
        None => Ok(()),
      });
      let output = child.wait_with_output();
      let written = writer
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("写入线程异常退出")));
      (written, output)
    });
    let output = output?;

    if !output.status.success() {
      return Err(ExtractionError::Engine {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    written?;

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!("tesseract 输出: {:?}", text);
    Ok(text)
  }
}
