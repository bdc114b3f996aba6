// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use zheyan::{
  FromUrl,
  input::InputWrapper,
  model::HttpClassifier,
  output::{OutputWrapper, SaliencyRenderer},
  scan::OcclusionScanner,
  session::Session,
  task::{InteractiveTask, OneShotTask, Task},
};

/// 分类输入边长
const IMAGE_SIZE: u32 = 224;

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("分类服务: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("目标类别: {}", args.target_class);

  let input = InputWrapper::<IMAGE_SIZE>::from_url(&args.input)?;
  let classifier = HttpClassifier::from_url(&args.model)?.with_api_key(args.api_key.clone());
  let output = OutputWrapper::from_url(&args.output)?;

  let scanner = OcclusionScanner::new(classifier, args.scanner_config());
  let renderer = SaliencyRenderer::new(args.render_config());
  let mut session = Session::<_, IMAGE_SIZE>::new(scanner, renderer);

  if args.interactive {
    let reader = BufReader::new(tokio::io::stdin());
    InteractiveTask::new(&args.target_class, args.blend, reader)
      .run_task(input, &mut session, output)
      .await?;
  } else {
    OneShotTask::new(&args.target_class, args.blend)
      .run_task(input, &mut session, output)
      .await?;
  }

  Ok(())
}
