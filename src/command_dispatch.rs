//! Purpose: Hold top-level CLI command dispatch for `couchlink`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every successful command prints exactly one JSON value on stdout.
//! Invariants: Commands that need no cluster (completion, version) never open a session.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    connection: &ConnectionArgs,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "couchlink", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Ddoc { command } => {
            let bucket = open_bucket(connection)?;
            let manager = bucket.view_indexes()?;
            let opts = view_options(connection);
            match command {
                DdocCommand::Get { name, namespace } => {
                    let doc = manager.get_design_document(&name, namespace.into(), &opts)?;
                    emit_json(json!({ "design_document": design_document_json(&doc) }));
                }
                DdocCommand::List { namespace } => {
                    let namespace: DesignDocumentNamespace = namespace.into();
                    let docs = manager.get_all_design_documents(namespace, &opts)?;
                    let values = docs.iter().map(design_document_json).collect::<Vec<_>>();
                    emit_json(json!({
                        "namespace": namespace.as_str(),
                        "design_documents": values,
                    }));
                }
                DdocCommand::Upsert {
                    name,
                    file,
                    namespace,
                } => {
                    let doc = read_design_document(&name, &file)?;
                    let namespace: DesignDocumentNamespace = namespace.into();
                    manager.upsert_design_document(&doc, namespace, &opts)?;
                    emit_json(json!({
                        "upserted": { "name": doc.name, "namespace": namespace.as_str() }
                    }));
                }
                DdocCommand::Drop { name, namespace } => {
                    let namespace: DesignDocumentNamespace = namespace.into();
                    manager.drop_design_document(&name, namespace, &opts)?;
                    emit_json(json!({
                        "dropped": { "name": name, "namespace": namespace.as_str() }
                    }));
                }
                DdocCommand::Publish { name } => {
                    manager.publish_design_document(&name, &opts)?;
                    emit_json(json!({ "published": { "name": name } }));
                }
            }
            bucket.session().close()?;
            Ok(RunOutcome::ok())
        }
        Command::Collection {
            command: CollectionCommand::Resolve { scope, collection },
        } => {
            let bucket = open_bucket(connection)?;
            let handle = bucket.collection(scope, collection);
            let timeout = connection
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(bucket.session().config().timeouts.kv);
            let ctx = OpContext::new().with_timeout(timeout);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start async runtime")
                        .with_source(err)
                })?;
            let id = runtime.block_on(handle.open(&ctx))?;
            emit_json(json!({
                "collection": {
                    "scope": handle.scope_name(),
                    "name": handle.name(),
                    "id": id,
                }
            }));
            bucket.session().close()?;
            Ok(RunOutcome::ok())
        }
        Command::Diagnostics => {
            let bucket = open_bucket(connection)?;
            let report = bucket.diagnostics()?;
            let value = serde_json::to_value(&report).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode diagnostics")
                    .with_source(err)
            })?;
            emit_json(json!({ "diagnostics": value }));
            bucket.session().close()?;
            Ok(RunOutcome::ok())
        }
    }
}
