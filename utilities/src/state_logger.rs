use crate::result::Result;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{error, trace};

/// Appends a JSON line to a file whenever the pushed state differs from the last one written.
pub struct StateLogger<T>
where
    T: PartialEq + Serialize + Send + Sync + 'static,
{
    current_state: Option<T>,
    file: tokio::fs::File,
    receiver: tokio::sync::mpsc::Receiver<T>,
}

impl<T> StateLogger<T>
where
    T: PartialEq + Serialize + Send + Sync + 'static,
{
    pub async fn start(target_file_path: &Path) -> Result<tokio::sync::mpsc::Sender<T>> {
        if let Some(parent) = target_file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::options()
            .append(true)
            .create(true)
            .open(target_file_path)
            .await?;
        let (tx, rx) = tokio::sync::mpsc::channel::<T>(10);
        let mut state_logger = Self {
            current_state: None,
            file,
            receiver: rx,
        };
        tokio::spawn(async move {
            while let Some(state) = state_logger.receiver.recv().await {
                trace!("Checking if the state snapshot is same or not");
                if state_logger.current_state.as_ref() != Some(&state) {
                    match state_logger.update_state(state).await {
                        Ok(_) => {
                            trace!("snapshot written successfully")
                        }
                        Err(e) => {
                            error!("Error while writing the state snapshot, {e}");
                        }
                    }
                }
            }
        });
        Ok(tx)
    }
    async fn update_state(&mut self, new_state: T) -> Result<()> {
        let json_line = serde_json::to_string(&new_state)?;
        self.current_state = Some(new_state);
        self.file.write_all(json_line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await?;
        Ok(())
    }
}
