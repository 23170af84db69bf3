//! Image push: gets one or more images onto every node of a running
//! cluster, without a registry. Grounded in the original's `push.go`: save
//! the images to a single archive, copy that archive into every node, then
//! `docker load` it there. No new concurrency pattern — both fan-outs reuse
//! [`crate::concurrency::fan_out`].

use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::concurrency::fan_out;
use crate::engine::{ContainerEngine, ImageEngine};
use crate::error::{Result, SindError};
use crate::label::cluster_label_filter;

const IMAGE_ARCHIVE_NAME: &str = "sind-images.tar";
const IMAGE_ARCHIVE_DEST: &str = "/";

/// Saves `image_refs` from the host engine and pushes the resulting archive
/// to every node of `cluster_name`.
pub async fn push_image_refs<E>(
    engine: &Arc<E>,
    cancel: &Cancellation,
    cluster_name: &str,
    image_refs: &[String],
) -> Result<()>
where
    E: ContainerEngine + ImageEngine + 'static,
{
    if image_refs.is_empty() {
        return Err(SindError::configuration("no image refs given to push"));
    }

    let saved = engine.save_images(cancel, image_refs).await?;
    push_image_file(engine, cancel, cluster_name, &saved).await
}

/// Pushes a pre-built image archive (the raw bytes of a `docker save`-style
/// export) to every node of `cluster_name`: wraps it in a one-entry tar so
/// it lands as a named file via [`ContainerEngine::copy_to_container`], then
/// runs `docker load -i` against that file in every node concurrently.
pub async fn push_image_file<E>(
    engine: &Arc<E>,
    cancel: &Cancellation,
    cluster_name: &str,
    image_archive: &[u8],
) -> Result<()>
where
    E: ContainerEngine + 'static,
{
    let filters = vec![cluster_label_filter(cluster_name)];
    let containers = engine.list_containers(cancel, &filters).await?;
    if containers.is_empty() {
        return Err(SindError::precondition(format!(
            "cluster {cluster_name:?} not found"
        )));
    }

    let archive = Arc::new(wrap_in_tar(IMAGE_ARCHIVE_NAME, image_archive)?);
    let ids: Vec<String> = containers.into_iter().map(|c| c.id).collect();

    let copy_engine = engine.clone();
    let copy_archive = archive.clone();
    fan_out(cancel, ids.clone(), move |id, item_cancel| {
        let engine = copy_engine.clone();
        let archive = copy_archive.clone();
        async move {
            engine
                .copy_to_container(&item_cancel, &id, &archive, IMAGE_ARCHIVE_DEST)
                .await
                .map_err(|e| SindError::engine(format!("copy image archive to {id}"), e))
        }
    })
    .await?;

    let load_engine = engine.clone();
    fan_out(cancel, ids, move |id, item_cancel| {
        let engine = load_engine.clone();
        async move {
            let cmd = vec![
                "docker".to_string(),
                "load".to_string(),
                "-i".to_string(),
                format!("/{IMAGE_ARCHIVE_NAME}"),
            ];
            let outcome = engine
                .exec(&item_cancel, &id, &cmd)
                .await
                .map_err(|e| SindError::engine(format!("load image on {id}"), e))?;

            if !outcome.succeeded() {
                return Err(SindError::engine(
                    format!("load image on {id}"),
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!(
                            "docker load exited with status {}: {}",
                            outcome.exit_code,
                            String::from_utf8_lossy(&outcome.stderr)
                        ),
                    ),
                ));
            }

            Ok(())
        }
    })
    .await?;

    Ok(())
}

/// Wraps `content` as a single file named `name` inside a tar archive, the
/// shape `ContainerEngine::copy_to_container` expects.
fn wrap_in_tar(name: &str, content: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_path(name).map_err(|e| {
        SindError::consistency(format!("unable to set tar entry path {name:?}: {e}"))
    })?;
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    builder
        .append(&header, content)
        .map_err(|e| SindError::consistency(format!("unable to build image archive: {e}")))?;

    builder
        .into_inner()
        .map_err(|e| SindError::consistency(format!("unable to finish image archive: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingEngine {
        containers: Vec<crate::engine::ContainerSummary>,
        copies: Arc<AtomicUsize>,
        execs: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ContainerEngine for RecordingEngine {
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
            unimplemented!()
        }
        async fn stop_container(&self, _cancel: &Cancellation, _id: &str) -> Result<()> {
            unimplemented!()
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
            self.execs.fetch_add(1, Ordering::SeqCst);
            Ok(crate::engine::ExecOutcome {
                exit_code: 0,
                stdout: vec![],
                stderr: vec![],
            })
        }
        async fn copy_to_container(
            &self,
            _cancel: &Cancellation,
            _id: &str,
            _tar_archive: &[u8],
            _dest_path: &str,
        ) -> Result<()> {
            self.copies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn container(id: &str) -> crate::engine::ContainerSummary {
        crate::engine::ContainerSummary {
            id: id.to_string(),
            hostname: format!("sind-t1-{id}"),
            image: "docker:24-dind".to_string(),
            labels: HashMap::new(),
            state: crate::engine::ContainerState::Running,
            ports: vec![],
            networks: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn push_image_file_copies_and_loads_on_every_node() {
        let copies = Arc::new(AtomicUsize::new(0));
        let execs = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(RecordingEngine {
            containers: vec![container("c1"), container("c2"), container("c3")],
            copies: copies.clone(),
            execs: execs.clone(),
        });

        push_image_file(&engine, &Cancellation::new(), "t1", b"fake-archive-bytes")
            .await
            .unwrap();

        assert_eq!(copies.load(Ordering::SeqCst), 3);
        assert_eq!(execs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn push_fails_when_cluster_not_found() {
        let engine = Arc::new(RecordingEngine {
            containers: vec![],
            copies: Arc::new(AtomicUsize::new(0)),
            execs: Arc::new(AtomicUsize::new(0)),
        });

        let result = push_image_file(&engine, &Cancellation::new(), "ghost", b"bytes").await;
        assert!(matches!(result, Err(SindError::Precondition(_))));
    }

    #[test]
    fn wraps_content_in_a_single_entry_tar() {
        let archive = wrap_in_tar(IMAGE_ARCHIVE_NAME, b"hello").unwrap();
        let mut reader = tar::Archive::new(archive.as_slice());
        let mut entries = reader.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str().unwrap(), IMAGE_ARCHIVE_NAME);

        use std::io::Read;
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"hello");
    }
}
