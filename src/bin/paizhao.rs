// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/bin/paizhao.rs - 牌照识读命令行入口
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

use std::{path::PathBuf, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use paizhao::{
  CancellationToken, FromUrl, Pipeline, PipelineError, PipelineOptions,
  detector::DetectorAdapter,
  model::YoloOnnxBuilder,
  ocr::{TesseractCliBuilder, TextExtractor},
  output::draw::Annotator,
  task::process_media,
};

/// Paizhao 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// YOLO ONNX 模型，例如 yolo:///path/to/best.onnx?conf=0.25
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 文字识别引擎，例如 tesseract:///?psm=8&lang=eng
  #[arg(long, value_name = "OCR", default_value = "tesseract:///")]
  pub ocr: Url,
  /// 待处理的图像或视频文件
  #[arg(long, value_name = "PATH")]
  pub input: PathBuf,
  /// 输出根目录，每个输入文件在其下建立同名子目录
  #[arg(long, value_name = "DIR", default_value = "temp")]
  pub output_dir: PathBuf,
  /// 处理视频帧的工作线程数
  #[arg(long, value_name = "N", default_value_t = 1)]
  pub workers: usize,
  /// 标注使用的字体文件，缺省时使用内置字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("文字识别: {}", args.ocr);
  info!("输入文件: {}", args.input.display());
  info!("输出目录: {}", args.output_dir.display());

  // 模型加载失败时不读取任何输入
  let model = YoloOnnxBuilder::from_url(&args.model)
    .and_then(|builder| builder.build())
    .map_err(|e| PipelineError::ModelLoad(e.to_string()))?;
  let engine = TesseractCliBuilder::from_url(&args.ocr)?.build()?;
  let annotator = match &args.font {
    Some(font) => Annotator::from_font_file(font)?,
    None => Annotator::default(),
  };
  let pipeline = Pipeline::new(
    DetectorAdapter::new(model),
    TextExtractor::new(engine),
    annotator,
  );

  let cancel = CancellationToken::new();
  let handler_token = cancel.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，处理完当前帧后退出...");
    handler_token.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let options = PipelineOptions {
    workers: args.workers.max(1),
  };
  let processed = process_media(&pipeline, &args.input, &args.output_dir, &cancel, &options)?;

  info!(
    "共 {} 帧, {} 个检测, 结果保存在 {}",
    processed.frames,
    processed.detections,
    processed.layout.directory.display()
  );
  for (i, text) in processed.transcript.iter().enumerate() {
    info!("识别结果 [{}]: {}", i, text);
  }

  Ok(())
}
