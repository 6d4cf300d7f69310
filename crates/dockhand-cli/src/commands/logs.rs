//! Log streaming command

use anyhow::{anyhow, Result};
use dockhand_core::{CloseReason, ContainerService, LogFrame, LogRequest};

/// Print a container's log until the stream ends or Ctrl-C
pub async fn logs(svc: &ContainerService, req: LogRequest) -> Result<()> {
    let container = req.container.clone();
    let mut sub = svc.open_logs(req).await?;
    let close = sub.close_handle();

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            close.cancel();
        }
    });

    let result = loop {
        match sub.recv().await {
            Some(LogFrame::Line(line)) => println!("{}", line),
            Some(LogFrame::Error { kind, message }) => {
                break Err(anyhow!("log stream failed [{}]: {}", kind, message))
            }
            Some(LogFrame::Closed(CloseReason::ContainerRemoved)) => {
                eprintln!("Container {} was removed", container);
                break Ok(());
            }
            Some(LogFrame::Closed(CloseReason::EndOfStream)) | None => break Ok(()),
        }
    };

    ctrl_c.abort();
    result
}
