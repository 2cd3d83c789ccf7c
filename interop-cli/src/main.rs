// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use color_eyre::Result;
use interop_cli::InteropMetricsApp;
use interop_metadata::MetricsExitCode;

fn main() -> Result<()> {
    color_eyre::install()?;

    let app = InteropMetricsApp::parse();
    app.init_logging();

    match app.exec() {
        Ok(()) => std::process::exit(MetricsExitCode::OK),
        Err(error) => {
            error.display_to_stderr();
            std::process::exit(error.process_exit_code())
        }
    }
}
