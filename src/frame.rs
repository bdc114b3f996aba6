// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/frame.rs - 方形 RGB 帧定义
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

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("帧尺寸不匹配: 期望 {expected}x{expected}, 实际 {width}x{height}")]
  SizeMismatch {
    expected: u32,
    width: u32,
    height: u32,
  },
}

/// N×N 的不可变 RGB 帧
///
/// 扫描与渲染只读取帧内容，所有派生图像（遮挡图、叠加图）都基于副本生成。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquareFrame<const N: u32> {
  image: RgbImage,
}

impl<const N: u32> SquareFrame<N> {
  /// 居中裁剪为正方形，再缩放到 N×N
  pub fn from_image(image: RgbImage) -> Result<Self, FrameError> {
    let (width, height) = image.dimensions();
    if N == 0 || width == 0 || height == 0 {
      return Err(FrameError::EmptyImage(width, height));
    }

    let square = crop_to_center(&image);
    let image = if square.width() == N {
      square
    } else {
      debug!("缩放帧: {}x{} -> {}x{}", square.width(), square.height(), N, N);
      imageops::resize(&square, N, N, FilterType::Triangle)
    };

    Ok(Self { image })
  }

  pub fn size(&self) -> u32 {
    N
  }

  pub fn as_rgb_image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_rgb_image(self) -> RgbImage {
    self.image
  }
}

/// 要求图像已经是 N×N，不做重采样
impl<const N: u32> TryFrom<RgbImage> for SquareFrame<N> {
  type Error = FrameError;

  fn try_from(image: RgbImage) -> Result<Self, Self::Error> {
    let (width, height) = image.dimensions();
    if width != N || height != N {
      return Err(FrameError::SizeMismatch {
        expected: N,
        width,
        height,
      });
    }
    Ok(Self { image })
  }
}

/// 以较短边为边长，沿较长边居中裁剪
fn crop_to_center(image: &RgbImage) -> RgbImage {
  let (width, height) = image.dimensions();
  let side = width.min(height);
  let x = (width - side) / 2;
  let y = (height - side) / 2;
  imageops::crop_imm(image, x, y, side, side).to_image()
}
