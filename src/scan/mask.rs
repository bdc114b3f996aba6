// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/scan/mask.rs - 遮挡窗口绘制
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

/// 默认遮挡颜色：不透明品红
pub const DEFAULT_MASK_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

/// 在副本上以 (x, y) 为左上角绘制 size×size 的不透明方块，超出图像部分被裁掉
pub fn mask_window(image: &RgbImage, x: u32, y: u32, size: u32, color: Rgb<u8>) -> RgbImage {
  let mut masked = image.clone();
  if size > 0 {
    let rect = Rect::at(x as i32, y as i32).of_size(size, size);
    draw_filled_rect_mut(&mut masked, rect, color);
  }
  masked
}
