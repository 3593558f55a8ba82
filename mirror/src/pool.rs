use std::sync::Arc;

use futures::{StreamExt, stream::FuturesUnordered};
use keel_assets::AssetBuilder;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    Error, TaskFailure,
    task::{CopyContext, CopyTask, build_copy_tasks},
};

pub const DEFAULT_COPY_CONCURRENCY: usize = 5;

/// Builds the copy task list for a cluster's assets and runs it with the
/// default pool width.
pub async fn copy_assets(
    assets: &AssetBuilder<'_>,
    ctx: &CopyContext<'_>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let tasks = build_copy_tasks(assets)?;
    run_copy_tasks(tasks, ctx, cancel, DEFAULT_COPY_CONCURRENCY).await
}

/// Runs the tasks with at most `concurrency` in flight. Tasks start in the
/// given order; a failing task never aborts the others. When any task
/// failed, an aggregate error is returned after all tasks drain.
pub async fn run_copy_tasks(
    tasks: Vec<CopyTask>,
    ctx: &CopyContext<'_>,
    cancel: &CancellationToken,
    concurrency: usize,
) -> Result<(), Error> {
    if tasks.is_empty() {
        return Ok(());
    }
    info!(tasks = tasks.len(), concurrency, "copying assets");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut pending = FuturesUnordered::new();
    for task in &tasks {
        let semaphore = Arc::clone(&semaphore);
        pending.push(async move {
            let target = task.target_name();
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (target, Err(Error::Cancelled)),
            };
            if cancel.is_cancelled() {
                return (target, Err(Error::Cancelled));
            }
            let result = task.run(ctx).await;
            (target, result)
        });
    }

    let mut failures = Vec::new();
    while let Some((target, result)) = pending.next().await {
        if let Err(error) = result {
            warn!(%target, %error, "copy task failed");
            failures.push(TaskFailure { target, error });
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        failures.sort_by(|a, b| a.target.cmp(&b.target));
        Err(Error::Aggregate(failures))
    }
}

#[cfg(test)]
mod tests {
    use keel_assets::{Hash, HashAlgorithm, MirroredAsset};
    use keel_vfs::{Acl, VfsContext, build_vfs_path};

    use super::*;

    fn file_task(hash: &Hash, source: &str, target: &str) -> CopyTask {
        let mirrored =
            MirroredAsset::parse_compact(&format!("{}@{source}", hash.hex())).unwrap();
        CopyTask::File {
            source: mirrored,
            target: build_vfs_path(target).unwrap(),
            hash: hash.clone(),
        }
    }

    #[tokio::test]
    async fn copies_every_task() {
        let vfs = VfsContext::new();
        let mut tasks = Vec::new();
        for name in ["a", "b", "c"] {
            let data = format!("bytes of {name}");
            let hash = Hash::of(HashAlgorithm::Sha256, data.as_bytes());
            let source = build_vfs_path(&format!("memfs://src/{name}")).unwrap();
            vfs.write_file(&source, data.as_bytes(), Acl::Private)
                .await
                .unwrap();
            tasks.push(file_task(
                &hash,
                &format!("memfs://src/{name}"),
                &format!("memfs://repo/{name}"),
            ));
        }

        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        run_copy_tasks(tasks, &ctx, &CancellationToken::new(), 2)
            .await
            .unwrap();

        for name in ["a", "b", "c"] {
            let target = build_vfs_path(&format!("memfs://repo/{name}")).unwrap();
            assert!(vfs.read_file(&target).await.is_ok());
        }
    }

    #[tokio::test]
    async fn aggregate_lists_every_failed_target() {
        let vfs = VfsContext::new();
        let hash = Hash::of(HashAlgorithm::Sha256, b"never published");
        let tasks = vec![
            file_task(&hash, "memfs://src/z", "memfs://repo/z"),
            file_task(&hash, "memfs://src/a", "memfs://repo/a"),
        ];

        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        let err = run_copy_tasks(tasks, &ctx, &CancellationToken::new(), 5)
            .await
            .unwrap_err();

        let targets: Vec<&str> = err.failures().iter().map(|f| f.target.as_str()).collect();
        assert_eq!(targets, ["memfs://repo/a", "memfs://repo/z"]);
        assert!(err.to_string().contains("memfs://repo/a"));
        assert!(err.to_string().contains("memfs://repo/z"));
    }

    #[tokio::test]
    async fn healthy_tasks_survive_a_failing_one() {
        let vfs = VfsContext::new();
        let data = b"published";
        let good_hash = Hash::of(HashAlgorithm::Sha256, data);
        let source = build_vfs_path("memfs://src/good").unwrap();
        vfs.write_file(&source, data, Acl::Private).await.unwrap();

        let missing_hash = Hash::of(HashAlgorithm::Sha256, b"missing");
        let tasks = vec![
            file_task(&missing_hash, "memfs://src/absent", "memfs://repo/absent"),
            file_task(&good_hash, "memfs://src/good", "memfs://repo/good"),
        ];

        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        let err = run_copy_tasks(tasks, &ctx, &CancellationToken::new(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.failures().len(), 1);

        let good = build_vfs_path("memfs://repo/good").unwrap();
        assert_eq!(vfs.read_file(&good).await.unwrap(), data);
    }

    #[tokio::test]
    async fn cancellation_fails_tasks_before_they_start() {
        let vfs = VfsContext::new();
        let data = b"published";
        let hash = Hash::of(HashAlgorithm::Sha256, data);
        let source = build_vfs_path("memfs://src/good").unwrap();
        vfs.write_file(&source, data, Acl::Private).await.unwrap();

        let tasks = vec![file_task(&hash, "memfs://src/good", "memfs://repo/good")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        let err = run_copy_tasks(tasks, &ctx, &cancel, 5).await.unwrap_err();
        assert!(matches!(err.failures()[0].error, Error::Cancelled));

        let target = build_vfs_path("memfs://repo/good").unwrap();
        assert!(vfs.read_file(&target).await.is_err());
    }

    #[tokio::test]
    async fn empty_task_list_is_a_no_op() {
        let vfs = VfsContext::new();
        let ctx = CopyContext {
            vfs: &vfs,
            registry: None,
        };
        run_copy_tasks(Vec::new(), &ctx, &CancellationToken::new(), 5)
            .await
            .unwrap();
    }
}
