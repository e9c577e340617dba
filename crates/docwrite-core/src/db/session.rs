
use crate::{
    access::RoleAccessGate,
    config::{ConfigError, DataStoreParser, EngineConfig, ParserRegistry, parse_entity},
    db::{
        context::OpContext,
        doc::CrudOperation,
        executor::{SaveExecutor, UpdateExecutor, UpdateTransform},
        projection::Projector,
        response::{WriteFailure, WriteOutcome},
        store::{DocumentStore, Query},
    },
    error::InternalError,
    intercept::InterceptorRegistry,
    model::{EntityIdentity, EntityModel, ID_FIELD},
    obs::sink::{MetricsSink, with_metrics_sink},
    translate::{JsonTranslator, Translator},
    validate::SchemaValidator,
};
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, rc::Rc};
use tracing::{debug, info};

///
/// DbSession
///
/// Session-scoped handle binding a store, the engine configuration, the
/// registered entity models and interceptors. Policy (debug, metrics) is
/// carried here and handed to every executor it builds.
///

pub struct DbSession<S: DocumentStore> {
    store: S,
    config: EngineConfig,
    translator: Box<dyn Translator>,
    parser: Box<dyn DataStoreParser>,
    entities: BTreeMap<String, EntityModel>,
    interceptors: InterceptorRegistry,
    debug: bool,
    metrics: Option<Rc<dyn MetricsSink>>,
}

impl<S: DocumentStore> DbSession<S> {
    // ======================================================================
    // Construction & configuration
    // ======================================================================

    /// Validate `config` and resolve its metadata parser from the built-in
    /// registry.
    pub fn new(store: S, config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_parsers(store, config, &ParserRegistry::new())
    }

    pub fn with_parsers(
        store: S,
        config: EngineConfig,
        parsers: &ParserRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let parser = parsers.resolve(&config.metadata_parser)?;

        Ok(Self {
            store,
            config,
            translator: Box::new(JsonTranslator),
            parser,
            entities: BTreeMap::new(),
            interceptors: InterceptorRegistry::new(),
            debug: false,
            metrics: None,
        })
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Box<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: Rc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    fn with_metrics<T>(&self, f: impl FnOnce() -> T) -> T {
        if let Some(sink) = &self.metrics {
            with_metrics_sink(Rc::clone(sink), f)
        } else {
            f()
        }
    }

    // ======================================================================
    // Accessors
    // ======================================================================

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn interceptors_mut(&mut self) -> &mut InterceptorRegistry {
        &mut self.interceptors
    }

    // ======================================================================
    // Entity registry
    // ======================================================================

    /// Register (or replace) an entity model.
    pub fn register_entity(&mut self, model: EntityModel) {
        debug!(entity = %model.name, collection = model.collection(), "entity registered");
        self.entities.insert(model.name.clone(), model);
    }

    /// Parse entity metadata with the configured parser and register it.
    pub fn register_entity_json(&mut self, node: &JsonValue) -> Result<&EntityModel, ConfigError> {
        let mut model = parse_entity(self.parser.as_ref(), node)?;
        if model.datastore.database.is_none() {
            model.datastore.database.clone_from(&self.config.database);
        }

        let name = model.name.clone();
        self.register_entity(model);

        self.entities
            .get(&name)
            .ok_or(ConfigError::InvalidEntity(name))
    }

    pub fn entity(&self, name: &str) -> Result<&EntityModel, InternalError> {
        self.entities
            .get(name)
            .ok_or_else(|| InternalError::unknown_entity(name))
    }

    // ======================================================================
    // Writes
    // ======================================================================

    /// Insert or save the documents of `op`, per `op.operation()`.
    pub fn save(&self, op: &mut OpContext, upsert: bool) -> Result<WriteOutcome, WriteFailure> {
        if op.operation() == CrudOperation::Update {
            return Err(InternalError::executor_invariant(
                "save called with an update-by-query context",
            )
            .into());
        }
        let model = self.entity(op.entity())?;
        let caller = op.caller().clone();
        let gate = RoleAccessGate::new(model, &caller);

        let mut executor = SaveExecutor::new(
            &self.store,
            self.translator.as_ref(),
            &gate,
            model,
            &self.interceptors,
        )
        .with_batch_size(self.config.batch_size);
        if self.debug {
            executor = executor.debug();
        }

        self.with_metrics(|| executor.execute(op, upsert))
    }

    /// Insert every document of `op` as new.
    pub fn insert(&self, op: &mut OpContext) -> Result<WriteOutcome, WriteFailure> {
        if op.operation() != CrudOperation::Insert {
            return Err(InternalError::executor_invariant(format!(
                "insert called with a {} context",
                op.operation()
            ))
            .into());
        }

        self.save(op, false)
    }

    /// Apply `transform` to every document matching `query`.
    pub fn update_by_query(
        &self,
        op: &mut OpContext,
        query: &Query,
        transform: &dyn UpdateTransform,
        projector: &dyn Projector,
    ) -> Result<WriteOutcome, WriteFailure> {
        let model = self.entity(op.entity())?;
        let caller = op.caller().clone();
        let gate = RoleAccessGate::new(model, &caller);
        let validator = SchemaValidator::new(model);

        let mut executor = UpdateExecutor::new(
            &self.store,
            self.translator.as_ref(),
            &gate,
            &validator,
            model,
            &self.interceptors,
        )
        .with_write_concern(self.config.write_concern)
        .with_max_result_set_size(self.config.max_result_set_size);
        if self.debug {
            executor = executor.debug();
        }

        self.with_metrics(|| executor.execute(op, query, transform, projector))
    }

    // ======================================================================
    // Index management
    // ======================================================================

    /// Create the unique indexes of `entity` when index management covers
    /// it. Returns whether the entity is managed.
    ///
    /// Non-default identity fields get a unique index of their own.
    pub fn ensure_indexes(&self, entity: &str) -> Result<bool, InternalError> {
        let model = self.entity(entity)?;
        if !self.config.index_management.is_managed(model) {
            debug!(entity, "indexes not managed");
            return Ok(false);
        }

        let identity = EntityIdentity::resolve(model);
        let default_identity = identity.storage_fields() == [ID_FIELD];
        let identity_index = (!default_identity).then(|| identity.paths().to_vec());

        for fields in identity_index.iter().chain(&model.unique_indexes) {
            self.store
                .ensure_unique_index(model.collection(), fields)?;
        }
        if self.debug {
            info!(
                entity,
                indexes = model.unique_indexes.len() + usize::from(!default_identity),
                "indexes ensured"
            );
        }

        Ok(true)
    }
}
