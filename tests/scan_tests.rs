// 该文件是 Zheyan （遮掩） 项目的一部分。
// tests/scan_tests.rs - 遮挡扫描测试
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

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{RegionClassifier, gray_frame};
use zheyan::scan::{OcclusionScanner, ScanError, ScanGeometry, ScannerConfig};

const USB_REGION: [u32; 4] = [96, 96, 128, 128];

fn scanner(classifier: &Arc<RegionClassifier>) -> OcclusionScanner<RegionClassifier> {
  OcclusionScanner::with_shared(Arc::clone(classifier), ScannerConfig::default())
}

#[tokio::test]
async fn reference_scan_fills_every_position() {
  let classifier = Arc::new(RegionClassifier::new(USB_REGION));
  let result = scanner(&classifier)
    .scan(&gray_frame::<224>(), "USB")
    .await
    .unwrap();

  assert_eq!(classifier.calls(), 122);
  assert_eq!(result.classified(), 121);
  assert!((result.baseline() - 0.9).abs() < 1e-6);
  assert_eq!(result.grid().dim(), 17);

  let grid = result.grid();
  for row in 0..17 {
    for col in 0..17 {
      let inside = (3..14).contains(&row) && (3..14).contains(&col);
      assert_eq!(grid.get(row, col).is_some(), inside, "({}, {})", row, col);
    }
  }

  // 位置 (0, 0) 的窗口不覆盖目标区域
  assert!((grid.get(3, 3).unwrap() - 0.9).abs() < 1e-6);
  // 位置 (5, 5) 的窗口 80..144 完整覆盖目标区域
  assert!((grid.get(8, 8).unwrap() - 0.1).abs() < 1e-5);
}

#[tokio::test]
async fn failed_cells_stay_empty() {
  let mut classifier = RegionClassifier::new(USB_REGION);
  classifier.fail_at = vec![(0, 0), (16, 32), (160, 160)];
  classifier.miss_at = vec![(48, 0)];
  let classifier = Arc::new(classifier);

  let result = scanner(&classifier)
    .scan(&gray_frame::<224>(), "usb")
    .await
    .unwrap();

  assert_eq!(classifier.calls(), 122);
  assert_eq!(result.classified(), 117);
  assert_eq!(result.grid().get(3, 3), None);
  assert_eq!(result.grid().get(5, 4), None);
  assert_eq!(result.grid().get(13, 13), None);
  assert_eq!(result.grid().get(3, 6), None);
  assert!(result.grid().get(3, 4).is_some());
}

#[tokio::test]
async fn scan_waits_for_every_task() {
  let mut classifier = RegionClassifier::new(USB_REGION);
  classifier.jitter = true;
  classifier.fail_at = (0..11).map(|i| (i * 16, i * 16)).collect();
  let classifier = Arc::new(classifier);

  let result = scanner(&classifier)
    .scan(&gray_frame::<224>(), "USB")
    .await
    .unwrap();

  // 返回时所有调用（包括失败的）都已结束
  assert_eq!(classifier.calls(), 122);
  assert_eq!(classifier.finished(), 122);
  assert_eq!(result.classified(), 121 - 11);
}

#[tokio::test]
async fn hung_call_times_out_as_missing_cell() {
  let mut classifier = RegionClassifier::new(USB_REGION);
  classifier.hang_at = vec![(32, 16)];
  let classifier = Arc::new(classifier);
  let config = ScannerConfig::default().with_timeout(Duration::from_millis(200));
  let scanner = OcclusionScanner::with_shared(Arc::clone(&classifier), config);

  let now = Instant::now();
  let result = scanner.scan(&gray_frame::<224>(), "USB").await.unwrap();

  assert!(now.elapsed() < Duration::from_secs(30));
  assert_eq!(result.classified(), 120);
  assert_eq!(result.grid().get(4, 5), None);
  assert_eq!(classifier.finished(), 121);
}

#[tokio::test]
async fn missing_baseline_aborts_after_join() {
  let mut classifier = RegionClassifier::new(USB_REGION);
  classifier.miss_baseline = true;
  let classifier = Arc::new(classifier);

  let result = scanner(&classifier).scan(&gray_frame::<224>(), "USB").await;

  assert_eq!(result, Err(ScanError::NoBaseline("USB".to_string())));
  assert_eq!(classifier.finished(), 122);
}

#[tokio::test]
async fn invalid_geometry_never_classifies() {
  let classifier = Arc::new(RegionClassifier::new([0, 0, 8, 8]));
  let config = ScannerConfig::default().with_geometry(ScanGeometry { step: 16, window: 64 });
  let scanner = OcclusionScanner::with_shared(Arc::clone(&classifier), config);

  let result = scanner.scan(&gray_frame::<40>(), "USB").await;

  assert!(matches!(result, Err(ScanError::InvalidGeometry(_))));
  assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn small_geometry_scan() {
  let classifier = Arc::new(RegionClassifier::new([0, 0, 8, 8]));
  let config = ScannerConfig::default().with_geometry(ScanGeometry { step: 8, window: 16 });
  let scanner = OcclusionScanner::with_shared(Arc::clone(&classifier), config);

  let result = scanner.scan(&gray_frame::<32>(), "USB").await.unwrap();

  // 3x3 个位置 + 原图
  assert_eq!(classifier.calls(), 10);
  assert_eq!(result.grid().dim(), 5);
  assert_eq!(result.image_size(), 32);
  assert!((result.grid().get(1, 1).unwrap() - 0.1).abs() < 1e-5);
  assert!((result.grid().get(1, 2).unwrap() - 0.9).abs() < 1e-6);
}
