// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/scan/grid.rs - 置信度网格
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

use serde::Serialize;

/// dim×dim 的置信度网格，`None` 表示未分类或分类失败
///
/// 四周留有 margin 圈空白，渲染时边缘单元也能取到完整的 kernel×kernel 邻域。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceGrid {
  dim: usize,
  cells: Vec<Option<f32>>,
}

impl ConfidenceGrid {
  pub fn new(dim: usize) -> Self {
    Self {
      dim,
      cells: vec![None; dim * dim],
    }
  }

  pub fn dim(&self) -> usize {
    self.dim
  }

  /// 越界返回 `None`
  pub fn get(&self, row: usize, col: usize) -> Option<f32> {
    if row >= self.dim || col >= self.dim {
      return None;
    }
    self.cells[row * self.dim + col]
  }

  /// 越界写入会被忽略
  pub fn set(&mut self, row: usize, col: usize, value: f32) {
    if row < self.dim && col < self.dim {
      self.cells[row * self.dim + col] = Some(value);
    }
  }

  /// 已填充的单元数
  pub fn populated(&self) -> usize {
    self.cells.iter().filter(|c| c.is_some()).count()
  }

  pub fn rows(&self) -> impl Iterator<Item = &[Option<f32>]> {
    self.cells.chunks(self.dim.max(1))
  }

  /// 以 (row, col) 为左上角的 kernel×kernel 邻域均值，只统计已填充单元
  ///
  /// 邻域内没有任何有效值时返回 `None`。
  pub fn neighborhood_mean(&self, row: usize, col: usize, kernel: usize) -> Option<f32> {
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for r in row..row + kernel {
      for c in col..col + kernel {
        if let Some(value) = self.get(r, c) {
          sum += value;
          count += 1;
        }
      }
    }
    (count > 0).then(|| sum / count as f32)
  }
}
