use std::sync::Arc;

use utilities::logger::{instrument, trace, tracing};

use super::CommandError;
use crate::master::service::MasterService;

pub struct DeleteFileHandler {
    master: Arc<dyn MasterService>,
}

impl DeleteFileHandler {
    pub fn new(master: Arc<dyn MasterService>) -> Self {
        Self { master }
    }

    /// The chunks stay on the chunk servers, the master forgets them after a grace period.
    #[instrument(skip(self))]
    pub async fn delete_file(&self, remote_path: &str) -> Result<String, CommandError> {
        trace!("sending a delete file request to the master");
        self.master.delete(remote_path).await?;
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cli::Command,
        command_runner::tests::{FakeCluster, runner},
    };

    #[tokio::test]
    async fn removes_the_file() {
        let cluster = FakeCluster::new(4);
        let runner = runner(&cluster);
        let rm = || Command::Rm {
            remote: "/f".to_owned(),
        };
        assert!(runner.run(rm()).await.is_err());

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("f");
        tokio::fs::write(&local, b"x").await.unwrap();
        runner
            .run(Command::Put {
                local: local.to_string_lossy().into_owned(),
                remote: "/f".to_owned(),
            })
            .await
            .unwrap();
        runner.run(rm()).await.unwrap();
        assert!(!cluster.has_file("/f"));
    }
}
