//! CVMFS transactions driven through the `cvmfs_server` tool.

use crate::config::CvmfsOpts;
use crate::shell::CommandRunner;
use fstx_core::{Aborter, BackendResult, Context, Starter, Stopper, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Marker file that makes CVMFS create a nested catalog for its directory.
pub const NESTED_CATALOG_MARKER: &str = ".cvmfscatalog";

/// A CVMFS repository transaction backend.
///
/// - start: `cvmfs_server transaction <repo>`
/// - stop: create missing nested-catalog markers, then `cvmfs_server publish <repo>`
/// - kill: `cvmfs_server abort -f <repo>`
#[derive(Debug, Clone)]
pub struct CvmfsBackend {
    opts: CvmfsOpts,
    runner: CommandRunner,
    catalog_dirs: Vec<PathBuf>,
}

impl CvmfsBackend {
    /// Creates a backend for the repository named in `opts`.
    pub fn new(opts: CvmfsOpts) -> Self {
        let runner = CommandRunner::new(&opts.binary).with_sudo_user(opts.sudo_user.clone());
        Self {
            opts,
            runner,
            catalog_dirs: Vec::new(),
        }
    }

    /// Requests a nested catalog in each directory on publish.
    pub fn with_catalog_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.catalog_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Builds a transaction driven by this backend.
    pub fn into_transaction(self) -> Transaction<Self, Self, Self> {
        Transaction::from_backend(Arc::new(self))
    }

    /// The backend options.
    pub fn opts(&self) -> &CvmfsOpts {
        &self.opts
    }

    /// The repository this backend publishes to.
    pub fn repo(&self) -> &str {
        &self.opts.nightly_repo
    }

    /// Directories that receive a nested-catalog marker on publish.
    pub fn catalog_dirs(&self) -> &[PathBuf] {
        &self.catalog_dirs
    }

    async fn server(&self, ctx: &Context, args: &[&str]) -> BackendResult<()> {
        info!(
            repo = %self.repo(),
            node = %self.opts.release_manager,
            command = %self.runner.command_line(args),
            "invoking cvmfs server"
        );
        self.runner.run(ctx, args).await?;
        Ok(())
    }
}

impl Starter for CvmfsBackend {
    async fn start(&self, ctx: &Context) -> BackendResult<()> {
        self.server(ctx, &["transaction", self.repo()]).await
    }

    fn open_attempts(&self) -> u32 {
        self.opts.open_attempts
    }
}

impl Stopper for CvmfsBackend {
    async fn stop(&self, ctx: &Context) -> BackendResult<()> {
        // Catalog markers are best effort.
        if let Err(e) = create_nested_catalogs(&self.catalog_dirs).await {
            warn!(repo = %self.repo(), error = %e, "failed to create nested catalogs");
        }
        self.server(ctx, &["publish", self.repo()]).await
    }

    fn publish_attempts(&self) -> u32 {
        self.opts.publish_attempts
    }

    fn publish_attempts_wait(&self) -> Duration {
        self.opts.publish_attempts_wait()
    }
}

impl Aborter for CvmfsBackend {
    async fn kill(&self, ctx: &Context) -> BackendResult<()> {
        self.server(ctx, &["abort", "-f", self.repo()]).await
    }
}

/// Creates the nested-catalog marker in each directory. Existing markers
/// are left as they are. Stops at the first failure.
pub async fn create_nested_catalogs(dirs: &[PathBuf]) -> std::io::Result<()> {
    for dir in dirs {
        ensure_exists(&dir.join(NESTED_CATALOG_MARKER)).await?;
    }
    Ok(())
}

async fn ensure_exists(path: &Path) -> std::io::Result<()> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use fstx_core::{BackendError, TransactionError};
    use tempfile::TempDir;

    fn backend(binary: &str) -> CvmfsBackend {
        CvmfsBackend::new(CvmfsOpts::new("nightlies.example.org").with_binary(binary))
    }

    #[tokio::test]
    async fn nested_catalogs_created() {
        let temp = TempDir::new().unwrap();
        let dirs = vec![temp.path().join("a"), temp.path().join("b")];
        for dir in &dirs {
            std::fs::create_dir(dir).unwrap();
        }

        create_nested_catalogs(&dirs).await.unwrap();
        create_nested_catalogs(&dirs).await.unwrap();

        for dir in &dirs {
            assert!(dir.join(NESTED_CATALOG_MARKER).is_file());
        }
    }

    #[tokio::test]
    async fn existing_marker_left_untouched() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join(NESTED_CATALOG_MARKER);
        std::fs::write(&marker, b"keep").unwrap();
        let modified = std::fs::metadata(&marker).unwrap().modified().unwrap();

        create_nested_catalogs(&[temp.path().to_path_buf()])
            .await
            .unwrap();

        assert_eq!(std::fs::read(&marker).unwrap(), b"keep");
        assert_eq!(
            std::fs::metadata(&marker).unwrap().modified().unwrap(),
            modified
        );
    }

    #[tokio::test]
    async fn nested_catalog_missing_dir_fails() {
        let temp = TempDir::new().unwrap();
        let err = create_nested_catalogs(&[temp.path().join("missing")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn lifecycle_with_succeeding_tool() {
        fstx_testkit::init_tracing();
        let temp = TempDir::new().unwrap();
        let mut txn = backend("true")
            .with_catalog_dirs([temp.path()])
            .into_transaction();
        let ctx = Context::background();

        txn.open(&ctx).await.unwrap();
        assert!(txn.is_ongoing());
        txn.close(&ctx).await.unwrap();
        assert!(!txn.is_ongoing());
        assert!(temp.path().join(NESTED_CATALOG_MARKER).is_file());
    }

    #[tokio::test]
    async fn publish_proceeds_when_catalogs_fail() {
        let temp = TempDir::new().unwrap();
        let backend = backend("true").with_catalog_dirs([temp.path().join("missing")]);
        backend.stop(&Context::background()).await.unwrap();
    }

    #[tokio::test]
    async fn failing_tool_reports_command() {
        let backend = backend("false");
        let err = backend.kill(&Context::background()).await.unwrap_err();
        match err {
            BackendError::Command { command, .. } => {
                assert_eq!(command, "false abort -f nightlies.example.org");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn abort_through_transaction() {
        let mut txn = backend("false").into_transaction();
        txn.set_ongoing();

        let err = txn.abort(&Context::background()).await.unwrap_err();
        assert!(matches!(err, TransactionError::Abort(_)));
    }

    #[test]
    fn retry_settings_come_from_opts() {
        let backend = CvmfsBackend::new(
            CvmfsOpts::new("repo")
                .with_open_attempts(4)
                .with_publish_attempts(6)
                .with_publish_attempts_wait(Duration::from_secs(12)),
        );
        assert_eq!(backend.open_attempts(), 4);
        assert_eq!(backend.publish_attempts(), 6);
        assert_eq!(backend.publish_attempts_wait(), Duration::from_secs(12));
        assert_eq!(backend.repo(), "repo");
        assert_eq!(backend.opts().binary, PathBuf::from("cvmfs_server"));
        assert!(backend.catalog_dirs().is_empty());
    }
}
