//! The conversion orchestrator.
//!
//! [`ConversionService`] validates requests, runs the collaborators under a
//! timeout, checks the resulting topology and produces the requested
//! payload. Plan-file imports are kept in the [`TopologyCache`] under a
//! fresh import id so that later downloads can regenerate exports.

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use topology::{CoordinateSystem, InvariantChecker, Route, SchematicGraph, Topology};
use utils::filename::sanitize_filename;
use uuid::Uuid;

use super::{
    adapters::{
        AdapterError, AdapterResult, CoordinateRepresentation, ExportOptions, FailureReason,
        GeometryImporter, PlanExporter, PlanImporter, RenderOptions, RouteDeriver,
        SchematicRenderer,
    },
    config::ConversionConfig,
    file_area::TempFileArea,
    overpass::OverpassImporter,
    planpro::{PlanProReader, PlanProWriter},
    routes::SignalRouteDeriver,
    schematic::OverviewRenderer,
    topology_cache::{CachedImport, TopologyCache},
    validation::{
        ExportFormat, GeometryRequest, OutputMode, PlanUpload, Polygon, ValidationError,
    },
};

/// Railway types the geometry importer knows about
pub const RAILWAY_OPTION_TYPES: [&str; 11] = [
    "rail",
    "abandoned",
    "construction",
    "disused",
    "funicular",
    "light_rail",
    "miniature",
    "monorail",
    "narrow_gauge",
    "subway",
    "tram",
];

#[derive(Debug, Error)]
pub enum StateError {
    #[error("No prior import for id {0}")]
    NoPriorImport(Uuid),
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Details are logged, never returned to callers
    #[error("Conversion failed ({reason})")]
    Conversion { reason: FailureReason },
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ConversionResult<T> = Result<T, ConversionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportTarget {
    #[default]
    Inline,
    File,
}

/// A generated file inside the temporary area
#[derive(Debug, Clone)]
pub struct FileReference {
    pub path: PathBuf,
    pub download_name: String,
    pub content_type: &'static str,
    /// Scope directory to release once the file has been served
    pub scope: Uuid,
}

#[derive(Debug, Clone)]
pub enum Payload {
    PlanInline(String),
    PlanFile(FileReference),
    Routes(Vec<Route>),
    Schematic(SchematicGraph),
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub export: ExportOptions,
    pub target: ExportTarget,
    pub render: RenderOptions,
}

#[derive(Debug, Clone)]
pub struct PlanImport {
    pub import_id: Uuid,
    pub filename: String,
    pub topology: Topology,
}

#[derive(Debug, Clone)]
pub struct SchematicImport {
    pub import_id: Uuid,
    pub filename: String,
    pub graph: SchematicGraph,
}

/// The external capabilities the orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub geometry: Arc<dyn GeometryImporter>,
    pub plan_importer: Arc<dyn PlanImporter>,
    pub plan_exporter: Arc<dyn PlanExporter>,
    pub route_deriver: Arc<dyn RouteDeriver>,
    pub renderer: Arc<dyn SchematicRenderer>,
}

impl Collaborators {
    pub fn builtin(config: &ConversionConfig) -> Self {
        Self {
            geometry: Arc::new(OverpassImporter::new(
                config.overpass_url.clone(),
                config.overpass_query_timeout_secs,
            )),
            plan_importer: Arc::new(PlanProReader),
            plan_exporter: Arc::new(PlanProWriter),
            route_deriver: Arc::new(SignalRouteDeriver::new(config.route_max_edges)),
            renderer: Arc::new(OverviewRenderer),
        }
    }
}

#[derive(Clone)]
pub struct ConversionService {
    inner: Arc<ConversionInner>,
}

struct ConversionInner {
    collaborators: Collaborators,
    cache: TopologyCache,
    files: TempFileArea,
    config: ConversionConfig,
    adapter_timeout: Duration,
}

impl ConversionService {
    pub fn new(collaborators: Collaborators, files: TempFileArea, config: ConversionConfig) -> Self {
        let timeout = config.adapter_timeout();
        Self::with_adapter_timeout(collaborators, files, config, timeout)
    }

    pub fn with_adapter_timeout(
        collaborators: Collaborators,
        files: TempFileArea,
        config: ConversionConfig,
        adapter_timeout: Duration,
    ) -> Self {
        let cache = TopologyCache::new(config.cache_ttl(), config.cache_max_entries);
        Self {
            inner: Arc::new(ConversionInner {
                collaborators,
                cache,
                files,
                config,
                adapter_timeout,
            }),
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &TopologyCache {
        &self.inner.cache
    }

    pub fn files(&self) -> &TempFileArea {
        &self.inner.files
    }

    /// Export options carrying the configured author and organisation
    pub fn export_defaults(&self) -> ExportOptions {
        ExportOptions {
            author: self.inner.config.default_author.clone(),
            organisation: self.inner.config.default_organisation.clone(),
            ..Default::default()
        }
    }

    pub async fn import_from_geometry(
        &self,
        polygon: &Polygon,
        option_types: &[String],
    ) -> ConversionResult<Topology> {
        if polygon.points().is_empty() {
            return Err(ValidationError::NoLocation.into());
        }
        if option_types.is_empty() {
            return Err(ValidationError::NoOptionTypes.into());
        }
        let unknown: Vec<&str> = option_types
            .iter()
            .map(String::as_str)
            .filter(|t| !RAILWAY_OPTION_TYPES.contains(t))
            .collect();
        if !unknown.is_empty() {
            tracing::debug!("Passing unrecognized railway types through: {:?}", unknown);
        }

        let coordinates = polygon.to_coordinate_string();
        let importer = self.inner.collaborators.geometry.clone();
        let topology = self
            .run_async("geometry import", importer.import(&coordinates, option_types))
            .await?;
        self.check_invariants("geometry import", &topology)?;

        tracing::info!(
            "Imported {} nodes and {} edges from geometry",
            topology.node_count(),
            topology.edge_count()
        );
        Ok(topology)
    }

    /// Import from geometry and produce the requested output inline
    pub async fn convert_geometry(
        &self,
        request: &GeometryRequest,
        export: ExportOptions,
    ) -> ConversionResult<Payload> {
        let topology = self
            .import_from_geometry(&request.polygon, &request.option_types)
            .await?;
        let options = DispatchOptions {
            export,
            target: ExportTarget::Inline,
            render: RenderOptions::default(),
        };
        self.dispatch_mode(topology, request.mode, &options).await
    }

    /// Persist, read and cache an uploaded plan file
    pub async fn import_from_plan_file(
        &self,
        upload: &PlanUpload,
        bytes: &[u8],
    ) -> ConversionResult<PlanImport> {
        let (scope, topology) = self.load_plan_file(upload, bytes).await?;
        let import_id = self.cache_import(upload, scope, topology.clone()).await;
        Ok(PlanImport {
            import_id,
            filename: upload.filename.clone(),
            topology,
        })
    }

    /// Import an uploaded plan file and render its overview graph
    pub async fn convert_plan_file(
        &self,
        upload: &PlanUpload,
        bytes: &[u8],
        scale: f64,
    ) -> ConversionResult<SchematicImport> {
        let (scope, topology) = self.load_plan_file(upload, bytes).await?;
        let render = RenderOptions {
            signal_filter: upload.signal_filter,
            scale,
        };
        let graph = match self.render(topology.clone(), render).await {
            Ok(graph) => graph,
            Err(e) => {
                self.release(scope).await;
                return Err(e);
            }
        };
        let import_id = self.cache_import(upload, scope, topology).await;
        Ok(SchematicImport {
            import_id,
            filename: upload.filename.clone(),
            graph,
        })
    }

    /// Produce the output named by `mode`
    pub async fn dispatch(
        &self,
        topology: Topology,
        mode: &str,
        options: &DispatchOptions,
    ) -> ConversionResult<Payload> {
        let mode: OutputMode = mode.parse()?;
        self.dispatch_mode(topology, mode, options).await
    }

    pub async fn dispatch_mode(
        &self,
        topology: Topology,
        mode: OutputMode,
        options: &DispatchOptions,
    ) -> ConversionResult<Payload> {
        match mode {
            OutputMode::PlanExport => {
                let document = self.export_plan(topology, options.export.clone()).await?;
                match options.target {
                    ExportTarget::Inline => Ok(Payload::PlanInline(document)),
                    ExportTarget::File => {
                        let name = export_file_name(options.export.filename.as_deref(), ExportFormat::Ppxml);
                        let file = self
                            .store_export(name, document.as_bytes(), ExportFormat::Ppxml)
                            .await?;
                        Ok(Payload::PlanFile(file))
                    }
                }
            }
            OutputMode::Routes => {
                let deriver = self.inner.collaborators.route_deriver.clone();
                let topology = self
                    .run_blocking("route derivation", move || {
                        let mut topology = topology;
                        deriver.derive(&mut topology)?;
                        Ok(topology)
                    })
                    .await?;
                tracing::info!("Derived {} routes", topology.routes.len());
                Ok(Payload::Routes(topology.routes))
            }
            OutputMode::Schematic => Ok(Payload::Schematic(
                self.render(topology, options.render).await?,
            )),
        }
    }

    /// Regenerate an export of a cached import into a fresh file
    pub async fn retrieve_cached_export(
        &self,
        import_id: Uuid,
        format: ExportFormat,
    ) -> ConversionResult<FileReference> {
        let entry = self
            .inner
            .cache
            .get(import_id)
            .ok_or(StateError::NoPriorImport(import_id))?;
        let mut topology = entry.topology;

        let bytes = match format {
            ExportFormat::Ppxml => {
                if entry.signal_filter {
                    topology.retain_main_signals();
                }
                let export = ExportOptions {
                    coordinate_representation: match topology.crs {
                        CoordinateSystem::Wgs84 => CoordinateRepresentation::Wgs84,
                        CoordinateSystem::Local => CoordinateRepresentation::Local,
                    },
                    version: entry.version,
                    ..self.export_defaults()
                };
                self.export_plan(topology, export).await?.into_bytes()
            }
            ExportFormat::Json => {
                let render = RenderOptions {
                    signal_filter: entry.signal_filter,
                    ..Default::default()
                };
                let graph = self.render(topology, render).await?;
                serde_json::to_vec_pretty(&graph).map_err(|e| {
                    self.fail(
                        "schematic export",
                        AdapterError::new(FailureReason::Internal, e.to_string()),
                    )
                })?
            }
        };

        let name = export_file_name(None, format);
        self.store_export(name, &bytes, format).await
    }

    /// Drop a served file together with its scope directory
    pub async fn release_file(&self, file: &FileReference) {
        self.release(file.scope).await;
    }

    /// Evict expired cache entries and their uploaded files
    pub async fn evict_expired(&self) -> usize {
        let expired = self.inner.cache.sweep_expired();
        for entry in &expired {
            self.release(entry.scope).await;
        }
        if !expired.is_empty() {
            tracing::info!("Evicted {} expired imports", expired.len());
        }
        expired.len()
    }

    /// Periodically evict expired imports
    pub fn spawn_cache_eviction(&self) -> JoinHandle<()> {
        let service = self.clone();
        let period = service.inner.config.cache_sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                service.evict_expired().await;
            }
        })
    }

    async fn load_plan_file(
        &self,
        upload: &PlanUpload,
        bytes: &[u8],
    ) -> ConversionResult<(Uuid, Topology)> {
        let scope = Uuid::new_v4();
        let path = match self.inner.files.write(scope, &upload.filename, bytes).await {
            Ok(path) => path,
            Err(e) => {
                self.release(scope).await;
                return Err(e.into());
            }
        };
        tracing::debug!("Stored upload {} in scope {}", upload.filename, scope);

        let importer = self.inner.collaborators.plan_importer.clone();
        let version = upload.version;
        let result = self
            .run_blocking("plan import", move || importer.import(&path, version))
            .await
            .and_then(|topology| {
                self.check_invariants("plan import", &topology)?;
                Ok(topology)
            });

        match result {
            Ok(topology) => {
                tracing::info!(
                    "Imported {} ({} nodes, {} edges, {} signals)",
                    upload.filename,
                    topology.node_count(),
                    topology.edge_count(),
                    topology.signal_count()
                );
                Ok((scope, topology))
            }
            Err(e) => {
                self.release(scope).await;
                Err(e)
            }
        }
    }

    async fn cache_import(&self, upload: &PlanUpload, scope: Uuid, topology: Topology) -> Uuid {
        let import_id = Uuid::new_v4();
        let evicted = self.inner.cache.insert(CachedImport {
            import_id,
            topology,
            filename: upload.filename.clone(),
            version: upload.version,
            signal_filter: upload.signal_filter,
            scope,
            created_at: Utc::now(),
        });
        for entry in evicted {
            self.release(entry.scope).await;
        }
        import_id
    }

    async fn export_plan(&self, topology: Topology, export: ExportOptions) -> ConversionResult<String> {
        let exporter = self.inner.collaborators.plan_exporter.clone();
        self.run_blocking("plan export", move || exporter.export(&topology, &export))
            .await
    }

    async fn render(&self, topology: Topology, options: RenderOptions) -> ConversionResult<SchematicGraph> {
        let renderer = self.inner.collaborators.renderer.clone();
        self.run_blocking("schematic rendering", move || renderer.render(&topology, &options))
            .await
    }

    async fn store_export(
        &self,
        download_name: String,
        bytes: &[u8],
        format: ExportFormat,
    ) -> ConversionResult<FileReference> {
        let scope = Uuid::new_v4();
        match self.inner.files.write(scope, &download_name, bytes).await {
            Ok(path) => Ok(FileReference {
                path,
                download_name,
                content_type: format.content_type(),
                scope,
            }),
            Err(e) => {
                self.release(scope).await;
                Err(e.into())
            }
        }
    }

    async fn release(&self, scope: Uuid) {
        if let Err(e) = self.inner.files.release(scope).await {
            tracing::warn!("Failed to remove temporary scope {}: {}", scope, e);
        }
    }

    fn check_invariants(&self, stage: &'static str, topology: &Topology) -> ConversionResult<()> {
        InvariantChecker::new()
            .ensure(topology)
            .map_err(|e| self.fail(stage, e.into()))
    }

    fn fail(&self, stage: &'static str, err: AdapterError) -> ConversionError {
        tracing::error!(stage, reason = %err.reason, "Conversion failed: {}", err.detail);
        ConversionError::Conversion { reason: err.reason }
    }

    async fn run_async<T, F>(&self, stage: &'static str, future: F) -> ConversionResult<T>
    where
        F: Future<Output = AdapterResult<T>>,
    {
        match tokio::time::timeout(self.inner.adapter_timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.fail(stage, err)),
            Err(_) => Err(self.fail(
                stage,
                AdapterError::new(
                    FailureReason::Timeout,
                    format!("no answer within {:?}", self.inner.adapter_timeout),
                ),
            )),
        }
    }

    /// Run CPU-bound collaborator work off the async workers
    async fn run_blocking<T, F>(&self, stage: &'static str, work: F) -> ConversionResult<T>
    where
        F: FnOnce() -> AdapterResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(work);
        let joined = self
            .run_async(stage, async move {
                handle
                    .await
                    .map_err(|e| AdapterError::new(FailureReason::Internal, e.to_string()))
            })
            .await?;
        joined.map_err(|err| self.fail(stage, err))
    }
}

/// `<sanitized stem>.<extension>`, defaulting to `schematic`
fn export_file_name(stem: Option<&str>, format: ExportFormat) -> String {
    let stem = stem
        .map(|s| s.trim_end_matches(&format!(".{}", format.extension())))
        .and_then(sanitize_filename)
        .unwrap_or_else(|| "schematic".to_string());
    format!("{stem}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use topology::{Edge, GeoPoint, Node, Signal, SignalDirection};

    use super::*;
    use crate::services::{planpro::PlanProVersion, validation::validate_geometry_request};

    /// A 300 m straight line with two main signals 200 m apart
    fn line() -> Topology {
        let mut topology = Topology::new(CoordinateSystem::Wgs84);
        let a = topology.add_node(Node::new("a", GeoPoint::new(52.0, 13.0)));
        let b = topology.add_node(Node::new("b", GeoPoint::new(52.0027, 13.0)));
        let edge = topology.add_edge(Edge::new(a, b)).unwrap();
        topology
            .add_signal(Signal::new("S1", edge, 50.0, SignalDirection::In))
            .unwrap();
        topology
            .add_signal(Signal::new("S2", edge, 250.0, SignalDirection::In))
            .unwrap();
        topology.classify_nodes();
        topology
    }

    struct SpyGeometry {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl GeometryImporter for SpyGeometry {
        async fn import(&self, polygon: &str, option_types: &[String]) -> AdapterResult<Topology> {
            self.calls
                .lock()
                .unwrap()
                .push((polygon.to_string(), option_types.to_vec()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(line())
        }
    }

    #[derive(Default)]
    struct SpyDeriver {
        calls: AtomicUsize,
    }

    impl RouteDeriver for SpyDeriver {
        fn derive(&self, topology: &mut Topology) -> AdapterResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SignalRouteDeriver::default().derive(topology)
        }
    }

    struct SlowPlanImporter(Duration);

    impl PlanImporter for SlowPlanImporter {
        fn import(&self, _path: &std::path::Path, _version: PlanProVersion) -> AdapterResult<Topology> {
            std::thread::sleep(self.0);
            Ok(line())
        }
    }

    struct DanglingPlanImporter;

    impl PlanImporter for DanglingPlanImporter {
        fn import(&self, _path: &std::path::Path, _version: PlanProVersion) -> AdapterResult<Topology> {
            let mut topology = line();
            let ghost = Edge::new(Uuid::new_v4(), Uuid::new_v4()).with_length(5.0);
            topology.edges.insert(ghost.uuid, ghost);
            Ok(topology)
        }
    }

    struct Harness {
        service: ConversionService,
        geometry: Arc<SpyGeometry>,
        deriver: Arc<SpyDeriver>,
        _parent: tempfile::TempDir,
    }

    fn harness_with(
        configure: impl FnOnce(&mut Collaborators),
        config: ConversionConfig,
        timeout: Duration,
        geometry_delay: Option<Duration>,
    ) -> Harness {
        let parent = tempfile::tempdir().unwrap();
        let files = TempFileArea::new_in(parent.path()).unwrap();
        let geometry = Arc::new(SpyGeometry {
            calls: Mutex::new(Vec::new()),
            delay: geometry_delay,
        });
        let deriver = Arc::new(SpyDeriver::default());
        let mut collaborators = Collaborators::builtin(&config);
        collaborators.geometry = geometry.clone();
        collaborators.route_deriver = deriver.clone();
        configure(&mut collaborators);

        Harness {
            service: ConversionService::with_adapter_timeout(collaborators, files, config, timeout),
            geometry,
            deriver,
            _parent: parent,
        }
    }

    fn harness() -> Harness {
        harness_with(|_| {}, ConversionConfig::default(), Duration::from_secs(5), None)
    }

    fn plan_document(topology: &Topology) -> Vec<u8> {
        PlanProWriter
            .export(topology, &ExportOptions::default())
            .unwrap()
            .into_bytes()
    }

    fn upload(filename: &str) -> PlanUpload {
        PlanUpload {
            filename: filename.to_string(),
            version: PlanProVersion::V1_10,
            signal_filter: false,
        }
    }

    #[tokio::test]
    async fn test_missing_option_types_never_reach_importer() {
        let h = harness();
        let polygon = Polygon::parse("[(0,0),(0,1)]").unwrap();
        let err = h.service.import_from_geometry(&polygon, &[]).await.unwrap_err();

        assert!(matches!(err, ConversionError::Validation(ValidationError::NoOptionTypes)));
        assert!(h.geometry.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_geometry_routes_scenario() {
        let h = harness();
        let request =
            validate_geometry_request(Some("[(0,0),(0,1)]"), Some("routes"), &["rail".to_string()])
                .unwrap();

        let payload = h
            .service
            .convert_geometry(&request, h.service.export_defaults())
            .await
            .unwrap();

        let calls = h.geometry.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("0 0 0 1".to_string(), vec!["rail".to_string()])]);
        assert_eq!(h.deriver.calls.load(Ordering::SeqCst), 1);
        let Payload::Routes(routes) = payload else {
            panic!("expected routes");
        };
        assert_eq!(routes.len(), 1);
        assert!(serde_json::to_value(&routes).unwrap().is_array());
    }

    #[tokio::test]
    async fn test_geometry_plan_export_is_inline() {
        let h = harness();
        let request =
            validate_geometry_request(Some("[(0,0),(0,1)]"), Some("planpro"), &["tram".to_string()])
                .unwrap();
        let payload = h
            .service
            .convert_geometry(&request, h.service.export_defaults())
            .await
            .unwrap();

        let Payload::PlanInline(document) = payload else {
            panic!("expected an inline document");
        };
        assert!(document.contains("PlanPro_Schnittstelle"));
        assert_eq!(h.service.files().file_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_geometry_timeout_is_a_conversion_error() {
        let h = harness_with(
            |_| {},
            ConversionConfig::default(),
            Duration::from_millis(20),
            Some(Duration::from_secs(5)),
        );
        let polygon = Polygon::parse("[(0,0)]").unwrap();
        let err = h
            .service
            .import_from_geometry(&polygon, &["rail".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Conversion {
                reason: FailureReason::Timeout
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_mode_writes_nothing() {
        let h = harness();
        let err = h
            .service
            .dispatch(line(), "pdf", &DispatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Validation(ValidationError::UnknownOutputMode(_))
        ));
        assert_eq!(h.service.files().file_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_plan_export_to_file() {
        let h = harness();
        let options = DispatchOptions {
            export: ExportOptions {
                filename: Some("../Station Nord.ppxml".to_string()),
                ..Default::default()
            },
            target: ExportTarget::File,
            render: RenderOptions::default(),
        };
        let Payload::PlanFile(file) = h.service.dispatch(line(), "planpro", &options).await.unwrap()
        else {
            panic!("expected a file");
        };

        assert_eq!(file.download_name, "Station_Nord.ppxml");
        assert!(file.path.starts_with(h.service.files().path()));
        assert!(std::fs::read_to_string(&file.path).unwrap().contains("TOP_Kante"));

        h.service.release_file(&file).await;
        assert!(!file.path.exists());
    }

    #[tokio::test]
    async fn test_dispatch_schematic() {
        let h = harness();
        let Payload::Schematic(graph) = h
            .service
            .dispatch(line(), "schematic", &DispatchOptions::default())
            .await
            .unwrap()
        else {
            panic!("expected a schematic");
        };
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_plan_imports_are_isolated() {
        let h = harness();
        let mut bigger = line();
        let extra = bigger.add_node(Node::new("c", GeoPoint::new(52.004, 13.0)));
        let b = *bigger.nodes.keys().nth(1).unwrap();
        bigger.add_edge(Edge::new(b, extra)).unwrap();

        let first = h
            .service
            .import_from_plan_file(&upload("first.ppxml"), &plan_document(&line()))
            .await
            .unwrap();
        let second = h
            .service
            .import_from_plan_file(&upload("second.ppxml"), &plan_document(&bigger))
            .await
            .unwrap();

        assert_ne!(first.import_id, second.import_id);
        let cache = h.service.cache();
        assert_eq!(cache.get(first.import_id).unwrap().topology.node_count(), 2);
        assert_eq!(cache.get(second.import_id).unwrap().topology.node_count(), 3);
        assert_eq!(cache.get(second.import_id).unwrap().filename, "second.ppxml");
    }

    #[tokio::test]
    async fn test_convert_plan_file_renders_and_caches() {
        let h = harness();
        let mut upload = upload("plan.ppxml");
        upload.signal_filter = true;

        let imported = h
            .service
            .convert_plan_file(&upload, &plan_document(&line()), 2.0)
            .await
            .unwrap();
        assert_eq!(imported.filename, "plan.ppxml");
        assert_eq!(imported.graph.nodes.len(), 4);
        assert!(imported.graph.properties.max_y <= 2.0);
        assert!(h.service.cache().get(imported.import_id).is_some());
        // the upload stays until its cache entry goes
        assert_eq!(h.service.files().file_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_import_id_is_a_state_error() {
        let h = harness();
        let err = h
            .service
            .retrieve_cached_export(Uuid::new_v4(), ExportFormat::Ppxml)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::State(StateError::NoPriorImport(_))));
    }

    #[tokio::test]
    async fn test_cached_exports_in_both_formats() {
        let h = harness();
        let imported = h
            .service
            .import_from_plan_file(&upload("plan.ppxml"), &plan_document(&line()))
            .await
            .unwrap();

        let ppxml = h
            .service
            .retrieve_cached_export(imported.import_id, ExportFormat::Ppxml)
            .await
            .unwrap();
        assert_eq!(ppxml.download_name, "schematic.ppxml");
        assert_eq!(ppxml.content_type, "application/xml");
        let text = std::fs::read_to_string(&ppxml.path).unwrap();
        let restored = PlanProReader::parse_str(&text, PlanProVersion::V1_10).unwrap();
        assert_eq!(restored.signal_count(), 2);

        let json = h
            .service
            .retrieve_cached_export(imported.import_id, ExportFormat::Json)
            .await
            .unwrap();
        assert_eq!(json.download_name, "schematic.json");
        let graph: SchematicGraph =
            serde_json::from_slice(&std::fs::read(&json.path).unwrap()).unwrap();
        assert_eq!(graph.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_plan_file_round_trip_through_dispatch() {
        let h = harness();
        let first = h
            .service
            .import_from_plan_file(&upload("plan.ppxml"), &plan_document(&line()))
            .await
            .unwrap();

        let options = DispatchOptions {
            export: ExportOptions {
                author: "A".to_string(),
                organisation: "B".to_string(),
                coordinate_representation: CoordinateRepresentation::Wgs84,
                ..Default::default()
            },
            ..Default::default()
        };
        let payload = h
            .service
            .dispatch(first.topology.clone(), "planpro", &options)
            .await
            .unwrap();
        let Payload::PlanInline(document) = payload else {
            panic!("expected an inline plan");
        };
        assert!(document.contains("<Planung_E_Ersteller><Wert>A</Wert></Planung_E_Ersteller>"));

        let second = h
            .service
            .import_from_plan_file(&upload("again.ppxml"), document.as_bytes())
            .await
            .unwrap();
        assert_ne!(first.import_id, second.import_id);
        assert_eq!(second.topology.node_count(), first.topology.node_count());
        assert_eq!(second.topology.edge_count(), first.topology.edge_count());
        assert_eq!(second.topology.signal_count(), first.topology.signal_count());
    }

    #[tokio::test]
    async fn test_plan_import_timeout_removes_upload() {
        let h = harness_with(
            |c| c.plan_importer = Arc::new(SlowPlanImporter(Duration::from_millis(300))),
            ConversionConfig::default(),
            Duration::from_millis(20),
            None,
        );
        let err = h
            .service
            .import_from_plan_file(&upload("plan.ppxml"), b"<irrelevant/>")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConversionError::Conversion {
                reason: FailureReason::Timeout
            }
        ));
        assert_eq!(h.service.files().file_count().unwrap(), 0);
        assert!(h.service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_invariant_violation_fails_import() {
        let h = harness_with(
            |c| c.plan_importer = Arc::new(DanglingPlanImporter),
            ConversionConfig::default(),
            Duration::from_secs(5),
            None,
        );
        let err = h
            .service
            .import_from_plan_file(&upload("plan.ppxml"), b"<irrelevant/>")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConversionError::Conversion {
                reason: FailureReason::Invariant
            }
        ));
        assert_eq!(h.service.files().file_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_upload_is_a_conversion_error() {
        let h = harness();
        let err = h
            .service
            .import_from_plan_file(&upload("plan.ppxml"), b"definitely not xml <")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Conversion {
                reason: FailureReason::Parse
            }
        ));
        assert_eq!(h.service.files().file_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_imports_are_evicted_with_their_files() {
        let config = ConversionConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        let h = harness_with(|_| {}, config, Duration::from_secs(5), None);
        h.service
            .import_from_plan_file(&upload("plan.ppxml"), &plan_document(&line()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(h.service.evict_expired().await, 1);
        assert!(h.service.cache().is_empty());
        assert_eq!(h.service.files().file_count().unwrap(), 0);
    }

    #[test]
    fn test_export_file_names() {
        assert_eq!(export_file_name(None, ExportFormat::Ppxml), "schematic.ppxml");
        assert_eq!(export_file_name(Some("Hbf"), ExportFormat::Ppxml), "Hbf.ppxml");
        assert_eq!(export_file_name(Some("../.."), ExportFormat::Json), "schematic.json");
    }
}
