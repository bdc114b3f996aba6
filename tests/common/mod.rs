// 该文件是 Zheyan （遮掩） 项目的一部分。
// tests/common/mod.rs - 测试用分类器与输出
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

#![allow(dead_code)]

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use zheyan::{
  frame::SquareFrame,
  model::{ClassScore, Classifier, ClassifierError, ClassifierResult, ClassifyOptions},
  output::{Render, SaliencyOverlay},
  scan::DEFAULT_MASK_COLOR,
};

pub const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

pub fn gray_frame<const N: u32>() -> SquareFrame<N> {
  SquareFrame::try_from(RgbImage::from_pixel(N, N, GRAY)).unwrap()
}

/// 按遮挡方块覆盖“目标区域”的比例降低 usb 置信度
///
/// 遮挡方块的位置通过第一个遮挡色像素识别。
pub struct RegionClassifier {
  /// [x0, y0, x1, y1)
  pub region: [u32; 4],
  pub baseline: f32,
  pub drop: f32,
  /// 以遮挡方块左上角像素标识的失败位置
  pub fail_at: Vec<(u32, u32)>,
  /// 永不返回的位置
  pub hang_at: Vec<(u32, u32)>,
  /// 结果中缺少目标类别的位置
  pub miss_at: Vec<(u32, u32)>,
  /// 原图分类不返回目标类别
  pub miss_baseline: bool,
  /// 按位置给每次调用加入不同的延迟
  pub jitter: bool,
  pub calls: AtomicUsize,
  pub finished: AtomicUsize,
}

impl RegionClassifier {
  pub fn new(region: [u32; 4]) -> Self {
    Self {
      region,
      baseline: 0.9,
      drop: 0.8,
      fail_at: Vec::new(),
      hang_at: Vec::new(),
      miss_at: Vec::new(),
      miss_baseline: false,
      jitter: false,
      calls: AtomicUsize::new(0),
      finished: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn finished(&self) -> usize {
    self.finished.load(Ordering::SeqCst)
  }

  fn mask_corner(image: &RgbImage) -> Option<(u32, u32)> {
    image
      .enumerate_pixels()
      .find(|(_, _, p)| **p == DEFAULT_MASK_COLOR)
      .map(|(x, y, _)| (x, y))
  }

  fn covered_fraction(&self, image: &RgbImage) -> f32 {
    let [x0, y0, x1, y1] = self.region;
    let mut covered = 0u32;
    for y in y0..y1 {
      for x in x0..x1 {
        if *image.get_pixel(x, y) == DEFAULT_MASK_COLOR {
          covered += 1;
        }
      }
    }
    covered as f32 / ((x1 - x0) * (y1 - y0)) as f32
  }
}

#[async_trait]
impl Classifier for RegionClassifier {
  async fn classify(
    &self,
    image: &RgbImage,
    _options: &ClassifyOptions,
  ) -> Result<Vec<ClassifierResult>, ClassifierError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let corner = Self::mask_corner(image);

    if self.jitter {
      let (x, y) = corner.unwrap_or((0, 0));
      let millis = ((x / 16 + 3 * (y / 16)) % 7) as u64;
      tokio::time::sleep(Duration::from_millis(millis)).await;
    }
    if let Some(c) = corner
      && self.hang_at.contains(&c)
    {
      tokio::time::sleep(Duration::from_secs(3600)).await;
    }

    let score = self.baseline - self.drop * self.covered_fraction(image);
    self.finished.fetch_add(1, Ordering::SeqCst);

    match corner {
      Some(c) if self.fail_at.contains(&c) => return Err(ClassifierError::Server(500)),
      Some(c) if self.miss_at.contains(&c) => return Ok(Vec::new()),
      None if self.miss_baseline => return Ok(Vec::new()),
      _ => {}
    }

    Ok(vec![ClassifierResult {
      classifier_id: "mock".to_string(),
      classes: vec![
        ClassScore {
          class_name: "cable".to_string(),
          score: Some(0.05),
        },
        ClassScore {
          class_name: "usb".to_string(),
          score: Some(score),
        },
      ],
    }])
  }
}

/// 记录每次收到的混合权重
#[derive(Clone, Default)]
pub struct CollectingOutput {
  pub overlays: Arc<Mutex<Vec<SaliencyOverlay>>>,
}

impl CollectingOutput {
  pub fn blend_weights(&self) -> Vec<f32> {
    self
      .overlays
      .lock()
      .unwrap()
      .iter()
      .map(|o| o.blend_weight)
      .collect()
  }
}

impl Render for CollectingOutput {
  type Error = std::io::Error;

  fn render_result(&self, overlay: &SaliencyOverlay) -> Result<(), Self::Error> {
    self.overlays.lock().unwrap().push(overlay.clone());
    Ok(())
  }
}
