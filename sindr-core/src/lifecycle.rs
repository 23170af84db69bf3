//! Start / stop: the symmetric pair that fans start/stop out over every
//! container labelled with a cluster, with no ordering and no quorum
//! polling. The nested cluster re-forms on its own because every node's
//! state is persisted inside its own container filesystem; callers that
//! need to observe recovery re-invoke [`crate::inspect::inspect_cluster`].

use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::concurrency::fan_out;
use crate::engine::ContainerEngine;
use crate::error::{Result, SindError};
use crate::label::cluster_label_filter;

/// Starts every container labelled with `cluster_name`, concurrently.
pub async fn start_cluster<E>(engine: &Arc<E>, cancel: &Cancellation, cluster_name: &str) -> Result<()>
where
    E: ContainerEngine + 'static,
{
    fan_out_over_cluster(engine, cancel, cluster_name, |engine, item_cancel, id| async move {
        engine
            .start_container(&item_cancel, &id)
            .await
            .map_err(|e| SindError::engine(format!("start container {id}"), e))
    })
    .await
}

/// Stops every container labelled with `cluster_name`, concurrently.
pub async fn stop_cluster<E>(engine: &Arc<E>, cancel: &Cancellation, cluster_name: &str) -> Result<()>
where
    E: ContainerEngine + 'static,
{
    fan_out_over_cluster(engine, cancel, cluster_name, |engine, item_cancel, id| async move {
        engine
            .stop_container(&item_cancel, &id)
            .await
            .map_err(|e| SindError::engine(format!("stop container {id}"), e))
    })
    .await
}

async fn fan_out_over_cluster<E, F, Fut>(
    engine: &Arc<E>,
    cancel: &Cancellation,
    cluster_name: &str,
    operation: F,
) -> Result<()>
where
    E: ContainerEngine + 'static,
    F: Fn(Arc<E>, Cancellation, String) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    let filters = vec![cluster_label_filter(cluster_name)];
    let containers = engine.list_containers(cancel, &filters).await?;
    if containers.is_empty() {
        return Err(SindError::precondition(format!(
            "cluster {cluster_name:?} not found"
        )));
    }

    let ids: Vec<String> = containers.into_iter().map(|c| c.id).collect();
    let engine = engine.clone();

    fan_out(cancel, ids, move |id, item_cancel| {
        operation(engine.clone(), item_cancel, id)
    })
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        containers: Vec<crate::engine::ContainerSummary>,
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ContainerEngine for CountingEngine {
        async fn list_containers(
            &self,
            _cancel: &Cancellation,
            _label_filters: &[String],
        ) -> Result<Vec<crate::engine::ContainerSummary>> {
            Ok(self.containers.clone())
        }
        async fn create_container(
            &self,
            _cancel: &Cancellation,
            _spec: &crate::engine::CreateContainerSpec,
        ) -> Result<String> {
            unimplemented!()
        }
        async fn start_container(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stop_container(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            _force: bool,
            _remove_volumes: bool,
        ) -> Result<()> {
            unimplemented!()
        }
        async fn inspect_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
        ) -> Result<crate::engine::ContainerSummary> {
            unimplemented!()
        }
        async fn exec(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            _cmd: &[String],
        ) -> Result<crate::engine::ExecOutcome> {
            unimplemented!()
        }
        async fn copy_to_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            _tar_archive: &[u8],
            _dest_path: &str,
        ) -> Result<()> {
            unimplemented!()
        }
    }

    fn container(id: &str) -> crate::engine::ContainerSummary {
        crate::engine::ContainerSummary {
            id: id.to_string(),
            hostname: format!("sind-t1-{id}"),
            image: "docker:24-dind".to_string(),
            labels: HashMap::new(),
            state: crate::engine::ContainerState::Exited,
            ports: vec![],
            networks: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn start_cluster_starts_every_labelled_container() {
        let started = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(CountingEngine {
            containers: vec![container("c1"), container("c2"), container("c3")],
            started: started.clone(),
            stopped: Arc::new(AtomicUsize::new(0)),
        });
        start_cluster(&engine, &Cancellation::new(), "t1").await.unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stop_cluster_fails_when_cluster_not_found() {
        let engine = Arc::new(CountingEngine {
            containers: vec![],
            started: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicUsize::new(0)),
        });
        let result = stop_cluster(&engine, &Cancellation::new(), "ghost").await;
        assert!(matches!(result, Err(SindError::Precondition(_))));
    }
}
