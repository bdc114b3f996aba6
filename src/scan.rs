// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/scan.rs - 遮挡扫描
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

use std::{borrow::Cow, future::Future, sync::Arc, time::Duration};

use image::{Rgb, RgbImage};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
  frame::SquareFrame,
  model::{Classifier, ClassifyOptions, target_confidence},
};

mod grid;
mod mask;

pub use self::grid::ConfidenceGrid;
pub use self::mask::{DEFAULT_MASK_COLOR, mask_window};

const DEFAULT_STEP: u32 = 16;
const DEFAULT_WINDOW: u32 = 64;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
  #[error("扫描几何参数无效: {0}")]
  InvalidGeometry(String),
  #[error("无法获得类别 {0} 的基准置信度")]
  NoBaseline(String),
}

/// 滑窗几何：步长与窗口边长（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanGeometry {
  pub step: u32,
  pub window: u32,
}

impl Default for ScanGeometry {
  fn default() -> Self {
    Self {
      step: DEFAULT_STEP,
      window: DEFAULT_WINDOW,
    }
  }
}

impl ScanGeometry {
  /// 每个窗口覆盖的显示单元边长
  pub fn kernel(&self) -> u32 {
    self.window / self.step
  }

  pub fn margin(&self) -> u32 {
    self.kernel() - 1
  }

  /// 每个方向上的窗口位置数
  pub fn positions(&self, size: u32) -> u32 {
    (size - self.window) / self.step + 1
  }

  /// 每个方向上的显示单元数
  pub fn display_cells(&self, size: u32) -> u32 {
    size / self.step
  }

  pub fn grid_dim(&self, size: u32) -> u32 {
    self.positions(size) + 2 * self.margin()
  }

  pub fn validate(&self, size: u32) -> Result<(), ScanError> {
    if self.step == 0 {
      return Err(ScanError::InvalidGeometry("步长必须大于 0".to_string()));
    }
    if self.window < self.step || self.window % self.step != 0 {
      return Err(ScanError::InvalidGeometry(format!(
        "窗口 {} 必须是步长 {} 的正整数倍",
        self.window, self.step
      )));
    }
    if size % self.step != 0 {
      return Err(ScanError::InvalidGeometry(format!(
        "图像边长 {} 不能被步长 {} 整除",
        size, self.step
      )));
    }
    if self.window > size {
      return Err(ScanError::InvalidGeometry(format!(
        "窗口 {} 大于图像边长 {}",
        self.window, size
      )));
    }
    Ok(())
  }
}

/// 扫描配置
#[derive(Debug, Clone)]
pub struct ScannerConfig {
  pub geometry: ScanGeometry,
  pub mask_color: Rgb<u8>,
  /// 单次分类调用的超时，超时按失败处理
  pub timeout: Duration,
  pub options: ClassifyOptions,
}

impl Default for ScannerConfig {
  fn default() -> Self {
    Self {
      geometry: ScanGeometry::default(),
      mask_color: DEFAULT_MASK_COLOR,
      timeout: DEFAULT_TIMEOUT,
      options: ClassifyOptions::default(),
    }
  }
}

impl ScannerConfig {
  pub fn with_geometry(mut self, geometry: ScanGeometry) -> Self {
    self.geometry = geometry;
    self
  }

  pub fn with_mask_color(mut self, color: Rgb<u8>) -> Self {
    self.mask_color = color;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_options(mut self, options: ClassifyOptions) -> Self {
    self.options = options;
    self
  }
}

/// 一次扫描的结果，扫描完成后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
  target_class: String,
  image_size: u32,
  geometry: ScanGeometry,
  baseline: f32,
  grid: ConfidenceGrid,
}

impl ScanResult {
  /// 几何参数或网格边长与图像尺寸不符时返回错误
  pub fn from_parts(
    target_class: impl Into<String>,
    image_size: u32,
    geometry: ScanGeometry,
    baseline: f32,
    grid: ConfidenceGrid,
  ) -> Result<Self, ScanError> {
    geometry.validate(image_size)?;
    let expected = geometry.grid_dim(image_size) as usize;
    if grid.dim() != expected {
      return Err(ScanError::InvalidGeometry(format!(
        "网格边长 {} 与几何参数要求的 {} 不符",
        grid.dim(),
        expected
      )));
    }

    Ok(Self {
      target_class: target_class.into(),
      image_size,
      geometry,
      baseline,
      grid,
    })
  }

  pub fn target_class(&self) -> &str {
    &self.target_class
  }

  pub fn image_size(&self) -> u32 {
    self.image_size
  }

  pub fn geometry(&self) -> ScanGeometry {
    self.geometry
  }

  pub fn baseline(&self) -> f32 {
    self.baseline
  }

  pub fn grid(&self) -> &ConfidenceGrid {
    &self.grid
  }

  /// 成功分类的遮挡位置数
  pub fn classified(&self) -> usize {
    self.grid.populated()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanCell {
  Baseline,
  Window { row: u32, col: u32 },
}

/// 遮挡扫描器
///
/// 原图分类一次作为基准，每个窗口位置各分类一次遮挡图。所有调用并发执行，
/// 全部结束（成功、失败或超时）后才汇总结果。
pub struct OcclusionScanner<C> {
  classifier: Arc<C>,
  config: Arc<ScannerConfig>,
}

impl<C> Clone for OcclusionScanner<C> {
  fn clone(&self) -> Self {
    Self {
      classifier: Arc::clone(&self.classifier),
      config: Arc::clone(&self.config),
    }
  }
}

impl<C: Classifier> OcclusionScanner<C> {
  pub fn new(classifier: C, config: ScannerConfig) -> Self {
    Self::with_shared(Arc::new(classifier), config)
  }

  pub fn with_shared(classifier: Arc<C>, config: ScannerConfig) -> Self {
    Self {
      classifier,
      config: Arc::new(config),
    }
  }

  pub fn config(&self) -> &ScannerConfig {
    &self.config
  }

  pub fn classifier(&self) -> &C {
    &self.classifier
  }

  pub async fn scan<const N: u32>(
    &self,
    frame: &SquareFrame<N>,
    target_class: &str,
  ) -> Result<ScanResult, ScanError> {
    let geometry = self.config.geometry;
    if let Err(e) = geometry.validate(N) {
      error!("{}", e);
      return Err(e);
    }

    let positions = geometry.positions(N);
    let margin = geometry.margin();
    let source = Arc::new(frame.as_rgb_image().clone());
    let target: Arc<str> = Arc::from(target_class);

    info!(
      "开始遮挡扫描: 类别 {}, {}x{} 个位置, 步长 {}, 窗口 {}",
      target_class, positions, positions, geometry.step, geometry.window
    );
    let now = std::time::Instant::now();

    let mut tasks = JoinSet::new();
    tasks.spawn(self.classify_cell(ScanCell::Baseline, &source, &target));
    for row in 0..positions {
      for col in 0..positions {
        tasks.spawn(self.classify_cell(ScanCell::Window { row, col }, &source, &target));
      }
    }
    let dispatched = tasks.len();
    debug!("已派发 {} 个分类任务", dispatched);

    let mut grid = ConfidenceGrid::new(geometry.grid_dim(N) as usize);
    let mut baseline = None;
    let mut resolved = 0usize;
    while let Some(joined) = tasks.join_next().await {
      resolved += 1;
      match joined {
        Ok((ScanCell::Baseline, value)) => baseline = value,
        Ok((ScanCell::Window { row, col }, Some(value))) => {
          grid.set((row + margin) as usize, (col + margin) as usize, value);
        }
        Ok((ScanCell::Window { .. }, None)) => {}
        Err(e) => warn!("分类任务异常退出: {}", e),
      }
    }

    info!(
      "遮挡扫描完成，耗时: {:.2?}, 任务 {}/{}, 有效位置 {}/{}",
      now.elapsed(),
      resolved,
      dispatched,
      grid.populated(),
      positions * positions
    );

    let Some(baseline) = baseline else {
      error!("基准分类未得到类别 {} 的置信度", target_class);
      return Err(ScanError::NoBaseline(target_class.to_string()));
    };
    info!("置信度: {:.4}", baseline);

    ScanResult::from_parts(target_class, N, geometry, baseline, grid)
  }

  fn classify_cell(
    &self,
    cell: ScanCell,
    source: &Arc<RgbImage>,
    target: &Arc<str>,
  ) -> impl Future<Output = (ScanCell, Option<f32>)> + Send + 'static + use<C> {
    let classifier = Arc::clone(&self.classifier);
    let config = Arc::clone(&self.config);
    let source = Arc::clone(source);
    let target = Arc::clone(target);

    async move {
      let image: Cow<'_, RgbImage> = match cell {
        ScanCell::Baseline => Cow::Borrowed(source.as_ref()),
        ScanCell::Window { row, col } => {
          let step = config.geometry.step;
          Cow::Owned(mask_window(
            &source,
            col * step,
            row * step,
            config.geometry.window,
            config.mask_color,
          ))
        }
      };

      let call = classifier.classify(&image, &config.options);
      let value = match tokio::time::timeout(config.timeout, call).await {
        Ok(Ok(results)) => {
          let value = target_confidence(&results, &target);
          if value.is_none() {
            debug!("{:?}: 结果中没有类别 {}", cell, target);
          }
          value
        }
        Ok(Err(e)) => {
          warn!("{:?}: 分类失败: {}", cell, e);
          None
        }
        Err(_) => {
          warn!("{:?}: 分类超时 ({:.2?})", cell, config.timeout);
          None
        }
      };
      debug!("{:?}: {:?}", cell, value);
      (cell, value)
    }
  }
}
