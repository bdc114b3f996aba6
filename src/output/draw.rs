// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/output/draw.rs - 显著性叠加层渲染
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

use std::str::FromStr;

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{frame::SquareFrame, scan::ScanResult};

const DEFAULT_SENSITIVITY: f32 = 5.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrawError {
  #[error("帧尺寸 {frame} 与扫描结果尺寸 {scan} 不一致")]
  FrameSizeMismatch { frame: u32, scan: u32 },
}

/// 叠加层的明暗约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayMode {
  /// 置信度下降越多越暗
  #[default]
  Darken,
  /// 置信度下降越多越亮，其余区域压暗
  Spotlight,
}

impl FromStr for OverlayMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "darken" => Ok(OverlayMode::Darken),
      "spotlight" => Ok(OverlayMode::Spotlight),
      other => Err(format!("未知的叠加模式: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
  /// 置信度下降的放大倍数
  pub sensitivity: f32,
  pub mode: OverlayMode,
}

impl Default for RenderConfig {
  fn default() -> Self {
    Self {
      sensitivity: DEFAULT_SENSITIVITY,
      mode: OverlayMode::default(),
    }
  }
}

/// NaN 视为 0
fn clamp_unit(value: f32) -> f32 {
  if value.is_nan() {
    0.0
  } else {
    value.clamp(0.0, 1.0)
  }
}

/// 显著性渲染器：只读扫描结果，不触发分类
#[derive(Debug, Clone, Copy, Default)]
pub struct SaliencyRenderer {
  config: RenderConfig,
}

impl SaliencyRenderer {
  pub fn new(config: RenderConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &RenderConfig {
    &self.config
  }

  /// 单元不透明度，结果总在 [0, 1] 内
  ///
  /// 邻域没有任何有效置信度时不绘制。
  pub fn cell_opacity(&self, baseline: f32, mean: Option<f32>, blend_weight: f32) -> f32 {
    let Some(mean) = mean else {
      return 0.0;
    };
    let blend = clamp_unit(blend_weight);
    let importance = clamp_unit((baseline - mean).max(0.0) * self.config.sensitivity);
    let opacity = match self.config.mode {
      OverlayMode::Darken => importance * blend,
      OverlayMode::Spotlight => (1.0 - importance) * blend,
    };
    clamp_unit(opacity)
  }

  /// 按行优先顺序给出所有显示单元的不透明度
  pub fn opacity_map(&self, scan: &ScanResult, blend_weight: f32) -> Vec<f32> {
    let geometry = scan.geometry();
    let cells = geometry.display_cells(scan.image_size()) as usize;
    let kernel = geometry.kernel() as usize;
    let grid = scan.grid();

    let mut map = Vec::with_capacity(cells * cells);
    for row in 0..cells {
      for col in 0..cells {
        let mean = grid.neighborhood_mean(row, col, kernel);
        map.push(self.cell_opacity(scan.baseline(), mean, blend_weight));
      }
    }
    map
  }

  /// 在原图副本上按单元叠加黑色
  pub fn render<const N: u32>(
    &self,
    frame: &SquareFrame<N>,
    scan: &ScanResult,
    blend_weight: f32,
  ) -> Result<RgbImage, DrawError> {
    if scan.image_size() != N {
      return Err(DrawError::FrameSizeMismatch {
        frame: N,
        scan: scan.image_size(),
      });
    }

    let step = scan.geometry().step;
    let cells = scan.geometry().display_cells(N);
    let opacities = self.opacity_map(scan, blend_weight);
    let mut image = frame.as_rgb_image().clone();

    for row in 0..cells {
      for col in 0..cells {
        let opacity = opacities[(row * cells + col) as usize];
        if opacity <= 0.0 {
          continue;
        }
        let keep = 1.0 - opacity;
        for y in row * step..(row + 1) * step {
          for x in col * step..(col + 1) * step {
            let pixel = image.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
              *channel = (*channel as f32 * keep).round() as u8;
            }
          }
        }
      }
    }

    debug!(
      "渲染完成: 混合权重 {:.2}, {}x{} 个单元",
      blend_weight, cells, cells
    );
    Ok(image)
  }
}
