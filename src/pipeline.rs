// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/pipeline.rs - 检测、识别与标注流水线
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

//! 流水线
//!
//! 每帧依次执行：检测 → 按检测框裁剪并识别文字 → 在副本上标注。
//! 视频由解码器逐帧产出，处理后按解码顺序写入编码器并累积识别文本。
//!
//! 多个工作线程时，解码、处理与写出分别在不同线程上进行，
//! 写出端用以帧序号为键的重排缓冲区恢复解码顺序。
//! 已解码但尚未写出的帧不超过 `workers * IN_FLIGHT_PER_WORKER` 帧，
//! 某一帧处理缓慢时解码端会等待，内存占用与视频长度无关。
//! 任意一帧检测失败都会中止整个视频，编码器不会完成，临时文件随之删除。

use std::{
  collections::BTreeMap,
  path::Path,
  sync::{Arc, Condvar, Mutex, PoisonError, mpsc},
  time::Instant,
};

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  cancel::CancellationToken,
  detector::Detect,
  error::{PipelineError, Stage},
  frame::{Frame, FrameOutcome},
  input::{FrameSource, VideoError, VideoInfo},
  ocr::{Recognize, TextExtractor},
  output::{FrameSink, draw::Annotator, transcript::Transcript},
};

/// 并行模式下每个工作线程允许的在途帧数
pub const IN_FLIGHT_PER_WORKER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
  /// 处理帧的工作线程数，1 表示严格顺序执行
  pub workers: usize,
}

impl Default for PipelineOptions {
  fn default() -> Self {
    Self { workers: 1 }
  }
}

/// 视频处理结果
#[derive(Debug, Clone)]
pub struct VideoSummary {
  pub info: VideoInfo,
  pub frames: u64,
  pub detections: usize,
  pub transcript: Transcript,
}

/// 检测器、文字提取器与标注器的组合，初始化后只读
pub struct Pipeline<D, R> {
  detector: D,
  extractor: TextExtractor<R>,
  annotator: Annotator,
}

impl<D: Detect, R: Recognize> Pipeline<D, R> {
  pub fn new(detector: D, extractor: TextExtractor<R>, annotator: Annotator) -> Self {
    Self {
      detector,
      extractor,
      annotator,
    }
  }

  pub fn process_frame(&self, frame: &Frame) -> Result<FrameOutcome, PipelineError> {
    self.run_frame(frame.index, &frame.image)
  }

  fn run_frame(&self, index: u64, image: &RgbImage) -> Result<FrameOutcome, PipelineError> {
    let now = Instant::now();
    let detections = self
      .detector
      .detect(image)
      .map_err(|source| PipelineError::Detection {
        frame_index: index,
        source,
      })?;

    let texts: Vec<String> = detections
      .iter()
      .map(|detection| self.extractor.extract_region(image, &detection.bbox))
      .collect();
    let annotated = self.annotator.annotate(image, &detections, &texts);

    debug!(
      "第 {} 帧: {} 个检测, 耗时 {:.2?}",
      index,
      detections.len(),
      now.elapsed()
    );
    Ok(FrameOutcome {
      index,
      annotated,
      detections,
      texts,
    })
  }

  /// 处理单张图像，检测失败时不产生任何结果
  pub fn process_image(&self, image: &RgbImage) -> Result<(RgbImage, Transcript), PipelineError> {
    let outcome = self.run_frame(0, image)?;
    info!("图像处理完成: {} 个检测", outcome.detection_count());
    Ok((outcome.annotated, Transcript::from(outcome.texts)))
  }

  /// 处理整段视频，只有全部帧成功写出后才会完成编码器
  pub fn process_video<S, K>(
    &self,
    source: S,
    mut sink: K,
    cancel: &CancellationToken,
    options: &PipelineOptions,
  ) -> Result<VideoSummary, PipelineError>
  where
    S: FrameSource + Send,
    K: FrameSink,
    D: Sync,
    R: Sync,
  {
    let info = source.info();
    let input = source.path().to_path_buf();
    let now = Instant::now();

    let mut assembly = Assembly::new(&mut sink);
    if options.workers <= 1 {
      self.run_sequential(source, &input, &info, cancel, &mut assembly)?;
    } else {
      self.run_parallel(source, &input, &info, cancel, options.workers, &mut assembly)?;
    }
    let Assembly {
      frames,
      detections,
      transcript,
      ..
    } = assembly;

    let output = sink.path().to_path_buf();
    sink
      .finish()
      .map_err(|e| PipelineError::io(Stage::Write, output, e))?;

    info!(
      "视频处理完成: {} 帧, {} 个检测, 耗时 {:.2?}",
      frames,
      detections,
      now.elapsed()
    );
    Ok(VideoSummary {
      info,
      frames,
      detections,
      transcript,
    })
  }

  fn run_sequential<S, K>(
    &self,
    mut source: S,
    input: &Path,
    info: &VideoInfo,
    cancel: &CancellationToken,
    assembly: &mut Assembly<'_, K>,
  ) -> Result<(), PipelineError>
  where
    S: FrameSource,
    K: FrameSink,
  {
    let mut seq = 0u64;
    loop {
      if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled { frame_index: seq });
      }
      let Some(item) = source.next() else {
        return Ok(());
      };
      let frame = checked_frame(item, info, input)?;
      assembly.accept(self.process_frame(&frame)?)?;
      seq += 1;
    }
  }

  fn run_parallel<S, K>(
    &self,
    source: S,
    input: &Path,
    info: &VideoInfo,
    cancel: &CancellationToken,
    workers: usize,
    assembly: &mut Assembly<'_, K>,
  ) -> Result<(), PipelineError>
  where
    S: FrameSource + Send,
    K: FrameSink,
    D: Sync,
    R: Sync,
  {
    // 写出端出错后通知解码与工作线程尽快退出
    let abort = CancellationToken::new();
    let capacity = workers * IN_FLIGHT_PER_WORKER;
    let window = FrameWindow::new(capacity);

    std::thread::scope(|scope| {
      let (job_tx, job_rx) = mpsc::sync_channel::<(u64, Frame)>(capacity);
      let job_rx = Arc::new(Mutex::new(job_rx));
      let (result_tx, result_rx) =
        mpsc::sync_channel::<(u64, Result<FrameOutcome, PipelineError>)>(capacity);

      for worker in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let abort = abort.clone();
        scope.spawn(move || {
          loop {
            let job = match job_rx.lock() {
              Ok(rx) => rx.recv(),
              Err(_) => break,
            };
            let Ok((seq, frame)) = job else {
              break;
            };
            if abort.is_cancelled() {
              break;
            }
            if result_tx.send((seq, self.process_frame(&frame))).is_err() {
              break;
            }
          }
          debug!("工作线程 {} 退出", worker);
        });
      }
      drop(job_rx);

      let producer_abort = abort.clone();
      let window = &window;
      scope.spawn(move || {
        let mut source = source;
        let mut seq = 0u64;
        while window.admit(seq, &producer_abort) {
          if cancel.is_cancelled() {
            let _ = result_tx.send((seq, Err(PipelineError::Cancelled { frame_index: seq })));
            break;
          }
          let Some(item) = source.next() else {
            break;
          };
          match checked_frame(item, info, input) {
            Ok(frame) => {
              if job_tx.send((seq, frame)).is_err() {
                break;
              }
            }
            Err(e) => {
              let _ = result_tx.send((seq, Err(e)));
              break;
            }
          }
          seq += 1;
        }
        debug!("解码线程退出: 已读取 {} 帧", seq);
      });

      let result = reassemble(result_rx, assembly, window);
      if result.is_err() {
        window.close(&abort);
      }
      result
    })
  }
}

/// 校验解码结果并转换错误
fn checked_frame(
  item: Result<Frame, VideoError>,
  info: &VideoInfo,
  input: &Path,
) -> Result<Frame, PipelineError> {
  let frame = item.map_err(|e| PipelineError::io(Stage::Load, input, e))?;
  if (frame.width(), frame.height()) != (info.width, info.height) {
    return Err(PipelineError::io(
      Stage::Load,
      input,
      VideoError::DimensionMismatch {
        expected: (info.width, info.height),
        actual: (frame.width(), frame.height()),
      },
    ));
  }
  Ok(frame)
}

/// 按帧序号恢复解码顺序后交给写出端，遇到第一个失败的帧即停止
fn reassemble<K: FrameSink>(
  results: mpsc::Receiver<(u64, Result<FrameOutcome, PipelineError>)>,
  assembly: &mut Assembly<'_, K>,
  window: &FrameWindow,
) -> Result<(), PipelineError> {
  let mut pending = BTreeMap::new();
  let mut next = 0u64;
  for (seq, result) in results {
    pending.insert(seq, result);
    while let Some(result) = pending.remove(&next) {
      assembly.accept(result?)?;
      next += 1;
      window.advance();
    }
  }
  Ok(())
}

/// 在途帧窗口：第 `seq` 帧只有在 `seq < 已写出帧数 + capacity` 时才能解码
struct FrameWindow {
  written: Mutex<u64>,
  changed: Condvar,
  capacity: u64,
}

impl FrameWindow {
  fn new(capacity: usize) -> Self {
    Self {
      written: Mutex::new(0),
      changed: Condvar::new(),
      capacity: capacity.max(1) as u64,
    }
  }

  /// 等待第 `seq` 帧进入窗口，任务中止时返回 `false`
  fn admit(&self, seq: u64, abort: &CancellationToken) -> bool {
    let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
    while seq >= *written + self.capacity && !abort.is_cancelled() {
      written = self
        .changed
        .wait(written)
        .unwrap_or_else(PoisonError::into_inner);
    }
    !abort.is_cancelled()
  }

  fn advance(&self) {
    *self.written.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    self.changed.notify_all();
  }

  /// 中止任务并唤醒等待中的解码线程
  fn close(&self, abort: &CancellationToken) {
    abort.cancel();
    drop(self.written.lock().unwrap_or_else(PoisonError::into_inner));
    self.changed.notify_all();
  }
}

/// 写出端：编码器与识别文本累积
struct Assembly<'a, K> {
  sink: &'a mut K,
  frames: u64,
  detections: usize,
  transcript: Transcript,
}

impl<'a, K: FrameSink> Assembly<'a, K> {
  fn new(sink: &'a mut K) -> Self {
    Self {
      sink,
      frames: 0,
      detections: 0,
      transcript: Transcript::new(),
    }
  }

  fn accept(&mut self, outcome: FrameOutcome) -> Result<(), PipelineError> {
    self
      .sink
      .write_frame(&outcome.annotated)
      .map_err(|e| PipelineError::io(Stage::Write, self.sink.path(), e))?;
    self.frames += 1;
    self.detections += outcome.detection_count();
    self.transcript.extend(outcome.texts);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::{
    cell::RefCell,
    path::PathBuf,
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use image::Rgb;

  use super::*;
  use crate::{
    detector::{BoundingBox, Detection, DetectionError},
    input::FrameRate,
    ocr::ExtractionError,
  };

  const SIZE: u32 = 100;

  /// 帧像素的红色通道即帧序号
  fn frame_image(index: u64) -> RgbImage {
    RgbImage::from_pixel(SIZE, SIZE, Rgb([index as u8, 0, 0]))
  }

  fn frame_index_of(image: &RgbImage) -> u64 {
    image.get_pixel(SIZE - 1, SIZE - 1)[0] as u64
  }

  struct StubDetector {
    boxes: Vec<Detection>,
    fail_on: Option<u64>,
    stall_on: Option<u64>,
    jitter: bool,
  }

  impl StubDetector {
    fn new(boxes: Vec<Detection>) -> Self {
      Self {
        boxes,
        fail_on: None,
        stall_on: None,
        jitter: false,
      }
    }

    fn failing_on(mut self, index: u64) -> Self {
      self.fail_on = Some(index);
      self
    }

    fn stalling_on(mut self, index: u64) -> Self {
      self.stall_on = Some(index);
      self
    }

    fn with_jitter(mut self) -> Self {
      self.jitter = true;
      self
    }
  }

  impl Detect for StubDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
      let index = image.get_pixel(0, 0)[0] as u64;
      if self.jitter {
        // 打乱各工作线程的完成顺序
        std::thread::sleep(Duration::from_millis((3 - index % 4) * 3));
      }
      if self.stall_on == Some(index) {
        std::thread::sleep(Duration::from_millis(300));
      }
      if self.fail_on == Some(index) {
        return Err(DetectionError::Inference(format!("frame {index}").into()));
      }
      Ok(self.boxes.clone())
    }
  }

  /// 返回裁剪区域左上角像素对应的帧序号
  #[derive(Default)]
  struct FrameTagger {
    calls: AtomicUsize,
  }

  impl Recognize for FrameTagger {
    fn recognize(&self, crop: &RgbImage) -> Result<String, ExtractionError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(format!(" F{} ", crop.get_pixel(0, 0)[0]))
    }
  }

  struct Fixed(&'static str);

  impl Recognize for Fixed {
    fn recognize(&self, _crop: &RgbImage) -> Result<String, ExtractionError> {
      Ok(self.0.to_string())
    }
  }

  struct MemorySource {
    frames: std::vec::IntoIter<Result<Frame, VideoError>>,
    info: VideoInfo,
    path: PathBuf,
    /// 已被取走的帧数
    decoded: Arc<AtomicUsize>,
  }

  impl MemorySource {
    fn new(count: u64) -> Self {
      Self::from_items((0..count).map(|i| Ok(Frame::new(i, frame_image(i)))).collect())
    }

    fn from_items(items: Vec<Result<Frame, VideoError>>) -> Self {
      let frame_count = Some(items.len() as u64);
      Self {
        frames: items.into_iter(),
        info: VideoInfo {
          width: SIZE,
          height: SIZE,
          frame_rate: FrameRate::new(30000, 1001).expect("rate"),
          frame_count,
        },
        path: PathBuf::from("memory.mp4"),
        decoded: Arc::new(AtomicUsize::new(0)),
      }
    }
  }

  impl Iterator for MemorySource {
    type Item = Result<Frame, VideoError>;

    fn next(&mut self) -> Option<Self::Item> {
      let item = self.frames.next()?;
      self.decoded.fetch_add(1, Ordering::SeqCst);
      Some(item)
    }
  }

  impl FrameSource for MemorySource {
    fn info(&self) -> VideoInfo {
      self.info
    }

    fn path(&self) -> &Path {
      &self.path
    }
  }

  #[derive(Default)]
  struct SinkLog {
    frames: Vec<RgbImage>,
    finished: bool,
  }

  struct MemorySink {
    log: Rc<RefCell<SinkLog>>,
    path: PathBuf,
  }

  fn memory_sink() -> (MemorySink, Rc<RefCell<SinkLog>>) {
    let log = Rc::new(RefCell::new(SinkLog::default()));
    let sink = MemorySink {
      log: Rc::clone(&log),
      path: PathBuf::from("output_memory.mp4"),
    };
    (sink, log)
  }

  impl FrameSink for MemorySink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<(), VideoError> {
      self.log.borrow_mut().frames.push(image.clone());
      Ok(())
    }

    fn finish(self) -> Result<(), VideoError> {
      self.log.borrow_mut().finished = true;
      Ok(())
    }

    fn path(&self) -> &Path {
      &self.path
    }
  }

  fn plate() -> Detection {
    Detection::new(BoundingBox::new(10, 10, 50, 50), 0.87)
  }

  fn tagging_pipeline(detector: StubDetector) -> Pipeline<StubDetector, FrameTagger> {
    Pipeline::new(
      detector,
      TextExtractor::new(FrameTagger::default()),
      Annotator::default(),
    )
  }

  fn sequential() -> PipelineOptions {
    PipelineOptions::default()
  }

  fn parallel() -> PipelineOptions {
    PipelineOptions { workers: 4 }
  }

  fn expected_transcript(frames: u64) -> Vec<String> {
    (0..frames).map(|i| format!("F{i}")).collect()
  }

  #[test]
  fn image_with_plate_yields_text_and_rectangle() {
    let pipeline = Pipeline::new(
      StubDetector::new(vec![plate()]),
      TextExtractor::new(Fixed("ABC123")),
      Annotator::default(),
    );
    let image = RgbImage::new(SIZE, SIZE);

    let (annotated, transcript) = pipeline.process_image(&image).expect("process");

    assert_eq!(transcript.lines(), ["ABC123".to_string()]);
    assert_eq!(annotated.get_pixel(10, 30), &Rgb([0, 255, 0]));
    assert_eq!(annotated.get_pixel(50, 30), &Rgb([0, 255, 0]));
    assert_eq!(annotated.get_pixel(30, 30), &Rgb([0, 0, 0]));
  }

  #[test]
  fn image_without_detections_is_unchanged() {
    let pipeline = tagging_pipeline(StubDetector::new(Vec::new()));
    let image = frame_image(7);
    let (annotated, transcript) = pipeline.process_image(&image).expect("process");
    assert_eq!(annotated, image);
    assert!(transcript.is_empty());
  }

  #[test]
  fn transcript_has_one_entry_per_detection() {
    let boxes = vec![
      plate(),
      Detection::new(BoundingBox::new(20, 20, 20, 40), 0.5), // 零宽
      Detection::new(BoundingBox::new(60, 60, 90, 80), 0.3),
    ];
    let pipeline = tagging_pipeline(StubDetector::new(boxes));
    let (_, transcript) = pipeline.process_image(&frame_image(3)).expect("process");

    assert_eq!(transcript.lines(), ["F3", "", "F3"]);
    assert_eq!(pipeline.extractor.engine().calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn image_detection_failure_is_reported() {
    let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]).failing_on(0));
    let err = pipeline.process_image(&frame_image(0)).expect_err("must fail");
    assert!(matches!(err, PipelineError::Detection { frame_index: 0, .. }));
    assert_eq!(err.stage(), Some(Stage::Detect));
  }

  fn run_video(
    pipeline: &Pipeline<StubDetector, FrameTagger>,
    frames: u64,
    options: PipelineOptions,
  ) -> (Result<VideoSummary, PipelineError>, Rc<RefCell<SinkLog>>) {
    let (sink, log) = memory_sink();
    let result = pipeline.process_video(
      MemorySource::new(frames),
      sink,
      &CancellationToken::new(),
      &options,
    );
    (result, log)
  }

  fn assert_complete_video(options: PipelineOptions) {
    let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]).with_jitter());
    let (result, log) = run_video(&pipeline, 12, options);
    let summary = result.expect("video");

    assert_eq!(summary.frames, 12);
    assert_eq!(summary.detections, 12);
    assert_eq!(summary.info.frame_rate, FrameRate::new(30000, 1001).expect("rate"));
    assert_eq!(summary.transcript.lines(), expected_transcript(12).as_slice());

    let log = log.borrow();
    assert!(log.finished);
    let order: Vec<u64> = log.frames.iter().map(frame_index_of).collect();
    assert_eq!(order, (0..12).collect::<Vec<_>>());
  }

  #[test]
  fn sequential_video_keeps_every_frame_in_order() {
    assert_complete_video(sequential());
  }

  #[test]
  fn parallel_video_restores_decode_order() {
    assert_complete_video(parallel());
  }

  #[test]
  fn parallel_and_sequential_outputs_match() {
    let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]));
    let (seq, seq_log) = run_video(&pipeline, 6, sequential());
    let (par, par_log) = run_video(&pipeline, 6, parallel());
    assert_eq!(seq.expect("seq").transcript, par.expect("par").transcript);
    assert_eq!(seq_log.borrow().frames, par_log.borrow().frames);
  }

  /// 记录每次写出时解码端已取走的帧数
  struct DecodeWatcher {
    decoded: Arc<AtomicUsize>,
    seen: Rc<RefCell<Vec<usize>>>,
    path: PathBuf,
  }

  impl FrameSink for DecodeWatcher {
    fn write_frame(&mut self, _image: &RgbImage) -> Result<(), VideoError> {
      self.seen.borrow_mut().push(self.decoded.load(Ordering::SeqCst));
      Ok(())
    }

    fn finish(self) -> Result<(), VideoError> {
      Ok(())
    }

    fn path(&self) -> &Path {
      &self.path
    }
  }

  #[test]
  fn slow_first_frame_holds_back_the_decoder() {
    const FRAMES: u64 = 60;
    let options = parallel();
    let capacity = options.workers * IN_FLIGHT_PER_WORKER;

    let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]).stalling_on(0));
    let source = MemorySource::new(FRAMES);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = DecodeWatcher {
      decoded: Arc::clone(&source.decoded),
      seen: Rc::clone(&seen),
      path: PathBuf::from("output_memory.mp4"),
    };

    let summary = pipeline
      .process_video(source, sink, &CancellationToken::new(), &options)
      .expect("video");
    assert_eq!(summary.frames, FRAMES);

    let seen = seen.borrow();
    assert_eq!(seen.len(), FRAMES as usize);
    // 写出第 k 帧时，解码端最多领先 capacity 帧
    for (written, decoded) in seen.iter().enumerate() {
      assert!(
        *decoded <= written + capacity,
        "frame {written}: {decoded} frames decoded, window {capacity}"
      );
    }
  }

  #[test]
  fn detection_failure_aborts_the_whole_video() {
    for options in [sequential(), parallel()] {
      for fail_on in [0, 7] {
        let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]).failing_on(fail_on));
        let (result, log) = run_video(&pipeline, 8, options);
        match result {
          Err(PipelineError::Detection { frame_index, .. }) => assert_eq!(frame_index, fail_on),
          other => panic!("workers {}: unexpected {other:?}", options.workers),
        }
        let log = log.borrow();
        assert!(!log.finished);
        assert!(log.frames.len() as u64 <= fail_on);
      }
    }
  }

  #[test]
  fn cancelled_video_is_not_finished() {
    for options in [sequential(), parallel()] {
      let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]));
      let (sink, log) = memory_sink();
      let cancel = CancellationToken::new();
      cancel.cancel();

      let result = pipeline.process_video(MemorySource::new(5), sink, &cancel, &options);
      assert!(matches!(result, Err(PipelineError::Cancelled { frame_index: 0 })));
      assert!(!log.borrow().finished);
      assert!(log.borrow().frames.is_empty());
    }
  }

  #[test]
  fn decode_errors_surface_as_load_failures() {
    for options in [sequential(), parallel()] {
      let pipeline = tagging_pipeline(StubDetector::new(Vec::new()));
      let items = vec![
        Ok(Frame::new(0, frame_image(0))),
        Err(VideoError::TruncatedFrame {
          index: 1,
          expected: 30000,
          actual: 12,
        }),
      ];
      let (sink, log) = memory_sink();
      let result = pipeline.process_video(
        MemorySource::from_items(items),
        sink,
        &CancellationToken::new(),
        &options,
      );
      let err = result.expect_err("must fail");
      assert_eq!(err.stage(), Some(Stage::Load));
      assert!(!log.borrow().finished);
    }
  }

  #[test]
  fn frames_with_unexpected_size_are_rejected() {
    let pipeline = tagging_pipeline(StubDetector::new(Vec::new()));
    let items = vec![Ok(Frame::new(0, RgbImage::new(SIZE / 2, SIZE)))];
    let (sink, _) = memory_sink();
    let result = pipeline.process_video(
      MemorySource::from_items(items),
      sink,
      &CancellationToken::new(),
      &sequential(),
    );
    assert!(matches!(
      result,
      Err(PipelineError::Io {
        stage: Stage::Load,
        ..
      })
    ));
  }

  #[test]
  fn empty_video_finishes_with_empty_transcript() {
    let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]));
    let (result, log) = run_video(&pipeline, 0, parallel());
    let summary = result.expect("video");
    assert_eq!(summary.frames, 0);
    assert!(summary.transcript.is_empty());
    assert!(log.borrow().finished);
  }

  #[test]
  fn repeated_runs_produce_identical_transcripts() {
    let pipeline = tagging_pipeline(StubDetector::new(vec![plate()]));
    let (first, _) = run_video(&pipeline, 4, sequential());
    let (second, _) = run_video(&pipeline, 4, sequential());
    assert_eq!(first.expect("first").transcript, second.expect("second").transcript);
  }
}
