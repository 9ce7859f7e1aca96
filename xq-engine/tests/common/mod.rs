//! Scriptable in-memory BaseX and Saxon units
//!
//! Query sources are scripts of `;`-separated directives:
//!
//! - `item:TYPE=VALUE` yields one item
//! - `var:NAME` yields the bound variable, `context` the context item
//! - `wait` blocks until [`Fake::release`] is called
//! - `error:CODE description` raises an unlocated query error,
//!   `located:CODE description` one at line 3, column 7
//! - `refuse`, `crash` and `panic` fail outside the query language
//!
//! A source starting with `syntax:` fails when it is prepared.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use basex_adapter::api as basex;
use basex_adapter::RawItem;
use parking_lot::{Condvar, Mutex};
use saxon_adapter::api as saxon;
use saxon_adapter::XdmItem;
use xq_engine::{Backend, Engine, Installation, Result, UnitLoader};
use xq_engine_traits::translate::STANDARD_ERROR_NAMESPACE;
use xq_engine_traits::{Exception, Fault, Handle, LoadingUnit, NativeResult, Property, StaticUnit};

type Item = (String, String);

/// Everything the fake engines did, in order.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn record<S: Into<String>>(&self, event: S) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e.starts_with(prefix))
    }

    /// Block until an event starting with `prefix` shows up.
    pub fn wait_for(&self, prefix: &str) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.count(prefix) == 0 {
            assert!(Instant::now() < deadline, "no {prefix:?} event in {:?}", self.events());
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            if self.opened.wait_for(&mut open, Duration::from_secs(10)).timed_out() {
                break;
            }
        }
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Vendor {
    Basex,
    Saxon,
}

/// State of one prepared query
#[derive(Default)]
struct Script {
    source: String,
    variables: BTreeMap<String, Item>,
    context: Option<Item>,
    items: VecDeque<Item>,
    started: bool,
}

fn script(handle: &mut Handle) -> NativeResult<&mut Script> {
    handle
        .downcast_mut::<Script>()
        .ok_or_else(|| Fault::Internal("not a query handle".into()))
}

fn value(handle: &Handle) -> NativeResult<Item> {
    handle
        .downcast_ref::<Item>()
        .cloned()
        .ok_or_else(|| Fault::Internal("not a value".into()))
}

fn query_error(vendor: Vendor, code: &str, description: &str, located: bool) -> Fault {
    match vendor {
        Vendor::Basex => {
            let message = if located {
                format!("Stopped at ., 3/7:\n[{}] {}", code, description)
            } else {
                format!("[{}] {}", code, description)
            };
            Exception::new("basex::query::QueryException")
                .with_message(message)
                .raise()
        }
        Vendor::Saxon => {
            let (prefix, local_part) = code.split_once(':').unwrap_or(("err", code));
            let namespace = if prefix == "err" {
                STANDARD_ERROR_NAMESPACE
            } else {
                "http://saxon.sf.net/"
            };
            let (line, column) = if located { (3, 7) } else { (-1, -1) };
            Exception::new("saxon::trans::XPathException")
                .with_message(description)
                .with_property("get_error_code_namespace", Property::Text(namespace.into()))
                .with_property("get_error_code_prefix", Property::Text(prefix.into()))
                .with_property("get_error_code_local_part", Property::Text(local_part.into()))
                .with_property("get_line_number", Property::Int(line))
                .with_property("get_column_number", Property::Int(column))
                .raise()
        }
    }
}

fn syntax_error(vendor: Vendor, source: &str) -> NativeResult<()> {
    if source.starts_with("syntax:") {
        return Err(query_error(vendor, "XPST0003", "Unexpected end of query.", true));
    }
    Ok(())
}

fn evaluate(vendor: Vendor, script: &Script, gate: &Gate) -> NativeResult<VecDeque<Item>> {
    let mut items = VecDeque::new();
    for directive in script.source.split(';').map(str::trim).filter(|d| !d.is_empty()) {
        let (name, argument) = directive.split_once(':').unwrap_or((directive, ""));
        match name {
            "wait" => gate.wait(),
            "item" => {
                let (type_name, value) = argument.split_once('=').unwrap_or(("xs:string", argument));
                items.push_back((value.to_string(), type_name.to_string()));
            }
            "var" => match script.variables.get(argument) {
                Some(item) => items.push_back(item.clone()),
                None => return Err(query_error(vendor, "XPDY0002", &format!("${} not bound", argument), false)),
            },
            "context" => match &script.context {
                Some(item) => items.push_back(item.clone()),
                None => return Err(query_error(vendor, "XPDY0002", "No context value bound.", false)),
            },
            "error" | "located" => {
                let (code, description) = argument.split_once(' ').unwrap_or((argument, ""));
                return Err(query_error(vendor, code, description, name == "located"));
            }
            "refuse" => return Err(Fault::Refused("operation refused by engine".into())),
            "crash" => return Err(Fault::Internal("engine crashed".into())),
            "panic" => panic!("vendor code panicked"),
            other => return Err(query_error(vendor, "XPST0017", &format!("unknown directive {}", other), true)),
        }
    }
    Ok(items)
}

/// Exports under their vendor symbols, minus the omitted ones.
struct UnitBuilder<'a> {
    unit: StaticUnit,
    omitted: &'a [&'a str],
}

impl UnitBuilder<'_> {
    fn export<F: ?Sized + Send + Sync + 'static>(mut self, symbol: &str, f: Arc<F>) -> Self {
        if !self.omitted.contains(&symbol) {
            self.unit = self.unit.export::<F>(symbol, f);
        }
        self
    }

    fn declare(mut self, type_name: &str) -> Self {
        self.unit = self.unit.declare(type_name);
        self
    }

    fn into_unit(self) -> Arc<dyn LoadingUnit> {
        self.unit.into_unit()
    }
}

/// A pair of fake vendor distributions sharing one recorder.
#[derive(Clone, Default)]
pub struct Fake {
    pub recorder: Recorder,
    gate: Arc<Gate>,
    contexts: Arc<AtomicUsize>,
}

impl Fake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.recorder.events()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.recorder.count(prefix)
    }

    /// Number of embedded BaseX contexts created
    pub fn contexts(&self) -> usize {
        self.contexts.load(Ordering::SeqCst)
    }

    /// Let every `wait` directive proceed.
    pub fn release(&self) {
        self.gate.release();
    }

    pub fn basex(&self) -> Engine {
        Engine::resolve(Backend::Basex, &Installation::from_unit(self.basex_unit(&[])), None).unwrap()
    }

    pub fn saxon(&self, edition: &'static str) -> Engine {
        Engine::resolve(Backend::Saxon, &Installation::from_unit(self.saxon_unit(edition)), None).unwrap()
    }

    pub fn basex_unit(&self, omitted: &[&str]) -> Arc<dyn LoadingUnit> {
        let recorder = &self.recorder;
        let on = |event: &'static str| {
            let recorder = recorder.clone();
            move || recorder.record(event)
        };
        let contexts = Arc::clone(&self.contexts);
        let context_new = on("context.new");
        let local_open = on("session.open local");
        let session_close = on("session.close");
        let query_close = on("query.close");
        let client_recorder = recorder.clone();
        let prepare_recorder = recorder.clone();
        let bind_recorder = recorder.clone();
        let context_recorder = recorder.clone();
        let next_recorder = recorder.clone();
        let gate = Arc::clone(&self.gate);

        UnitBuilder {
            unit: StaticUnit::new("basex-fake"),
            omitted,
        }
        .export::<basex::NewContext>(
            "basex::core::Context::new",
            Arc::new(move |_config: Option<&[u8]>| -> NativeResult<Handle> {
                contexts.fetch_add(1, Ordering::SeqCst);
                context_new();
                Ok(Handle::new("context"))
            }),
        )
        .export::<basex::NewLocalSession>(
            "basex::api::client::LocalSession::new",
            Arc::new(move |_context: &mut Handle| -> NativeResult<Handle> {
                local_open();
                Ok(Handle::new("local"))
            }),
        )
        .export::<basex::NewClientSession>(
            "basex::api::client::ClientSession::new",
            Arc::new(move |host: &str, port: u16, user: &str, _password: &str| -> NativeResult<Handle> {
                client_recorder.record(format!("session.open client {}@{}:{}", user, host, port));
                if host.ends_with(".invalid") {
                    return Err(Exception::new("java::net::ConnectException")
                        .with_message(format!("Connection refused: {}:{}", host, port))
                        .raise());
                }
                Ok(Handle::new("client"))
            }),
        )
        .export::<basex::SessionQuery>(
            "basex::api::client::Session::query",
            Arc::new(move |_session: &mut Handle, source: &str| -> NativeResult<Handle> {
                prepare_recorder.record(format!("query.prepare {}", source));
                syntax_error(Vendor::Basex, source)?;
                Ok(Handle::new(Script {
                    source: source.to_string(),
                    ..Script::default()
                }))
            }),
        )
        .export::<basex::Close>(
            "basex::api::client::Session::close",
            Arc::new(move |_session: &mut Handle| -> NativeResult<()> {
                session_close();
                Ok(())
            }),
        )
        .export::<basex::QueryBind>(
            "basex::api::client::Query::bind",
            Arc::new(
                move |query: &mut Handle, name: &str, value: &str, type_name: &str| -> NativeResult<()> {
                    bind_recorder.record(format!("query.bind {}={}:{}", name, value, type_name));
                    let query = script(query)?;
                    query
                        .variables
                        .insert(name.to_string(), (value.to_string(), type_name.to_string()));
                    query.started = false;
                    Ok(())
                },
            ),
        )
        .export::<basex::QueryContext>(
            "basex::api::client::Query::context",
            Arc::new(move |query: &mut Handle, value: &str, type_name: &str| -> NativeResult<()> {
                context_recorder.record(format!("query.context {}", type_name));
                let query = script(query)?;
                query.context = Some((value.to_string(), type_name.to_string()));
                query.started = false;
                Ok(())
            }),
        )
        .export::<basex::QueryNext>(
            "basex::api::client::Query::next",
            Arc::new(move |query: &mut Handle| -> NativeResult<Option<RawItem>> {
                let query = script(query)?;
                if !query.started {
                    next_recorder.record("query.execute");
                    query.items = evaluate(Vendor::Basex, query, &gate)?;
                    query.started = true;
                }
                match query.items.pop_front() {
                    Some((value, type_name)) => Ok(Some(RawItem::new(value, type_name))),
                    None => {
                        query.started = false;
                        Ok(None)
                    }
                }
            }),
        )
        .export::<basex::QueryInfo>(
            "basex::api::client::Query::info",
            Arc::new(|query: &mut Handle| -> NativeResult<String> {
                let query = script(query)?;
                Ok(format!(
                    "Optimized Query:\n{}\n\nParsing: 0.5 ms\nTotal Time: 2.5 ms\n\nHit(s): {} Items\n",
                    query.source,
                    query.items.len()
                ))
            }),
        )
        .export::<basex::Close>(
            "basex::api::client::Query::close",
            Arc::new(move |_query: &mut Handle| -> NativeResult<()> {
                query_close();
                Ok(())
            }),
        )
        .declare("basex::query::QueryException")
        .declare("basex::core::BaseXException")
        .into_unit()
    }

    pub fn saxon_unit(&self, edition: &'static str) -> Arc<dyn LoadingUnit> {
        let schema_aware = edition.eq_ignore_ascii_case("EE");
        let open_recorder = self.recorder.clone();
        let close_recorder = self.recorder.clone();
        let document_recorder = self.recorder.clone();
        let gate = Arc::clone(&self.gate);

        let mut unit = UnitBuilder {
            unit: StaticUnit::new(format!("saxon-fake ({})", edition)),
            omitted: &[],
        }
        .export::<saxon::NewProcessor>(
            "saxon::s9api::Processor::new",
            Arc::new(move |_config: Option<&[u8]>| -> NativeResult<Handle> {
                open_recorder.record("session.open local");
                Ok(Handle::new("processor"))
            }),
        )
        .export::<saxon::Close>(
            "saxon::s9api::Processor::close",
            Arc::new(move |_processor: &mut Handle| -> NativeResult<()> {
                close_recorder.record("session.close");
                Ok(())
            }),
        )
        .export::<saxon::Edition>(
            "saxon::Version::get_software_edition",
            Arc::new(move || -> NativeResult<String> { Ok(edition.to_string()) }),
        )
        .export::<saxon::MakeAtomic>(
            "saxon::s9api::XdmAtomicValue::make",
            Arc::new(move |_processor: &mut Handle, value: &str, type_name: &str| -> NativeResult<Handle> {
                if !schema_aware && type_name == "xs:dateTimeStamp" {
                    return Err(query_error(
                        Vendor::Saxon,
                        "XPST0051",
                        "Unknown atomic type xs:dateTimeStamp",
                        false,
                    ));
                }
                Ok(Handle::new((value.to_string(), type_name.to_string())))
            }),
        )
        .export::<saxon::BuildDocument>(
            "saxon::s9api::DocumentBuilder::build",
            Arc::new(move |_processor: &mut Handle, text: &str, system_id: &str| -> NativeResult<Handle> {
                document_recorder.record(format!("document.build {}", system_id));
                Ok(Handle::new((text.to_string(), "document-node()".to_string())))
            }),
        )
        .export::<saxon::IteratorNext>(
            "saxon::s9api::XdmSequenceIterator::next",
            Arc::new(|iterator: &mut Handle| -> NativeResult<Option<XdmItem>> {
                let items = iterator
                    .downcast_mut::<VecDeque<Item>>()
                    .ok_or_else(|| Fault::Internal("not an iterator".into()))?;
                Ok(items
                    .pop_front()
                    .map(|(value, type_name)| XdmItem::new(value, type_name)))
            }),
        )
        .declare("saxon::s9api::SaxonApiException")
        .declare("saxon::trans::XPathException");

        let kinds = [
            ("XQueryCompiler", "XQueryExecutable", "XQueryEvaluator", "set_external_variable", "set_context_item", "iterator"),
            ("XPathCompiler", "XPathExecutable", "XPathSelector", "set_variable", "set_context_item", "iterator"),
            (
                "XsltCompiler",
                "XsltExecutable",
                "Xslt30Transformer",
                "set_stylesheet_parameter",
                "set_global_context_item",
                "apply_templates",
            ),
        ];
        for (compiler, executable, evaluator, set_variable, set_context, iterate) in kinds {
            let prepare_recorder = self.recorder.clone();
            let execute_recorder = self.recorder.clone();
            let gate = Arc::clone(&gate);
            let load = if evaluator == "Xslt30Transformer" { "load30" } else { "load" };
            unit = unit
                .export::<saxon::Compile>(
                    &format!("saxon::s9api::{}::compile", compiler),
                    Arc::new(move |_processor: &mut Handle, source: &str| -> NativeResult<Handle> {
                        prepare_recorder.record(format!("query.prepare {}", source));
                        syntax_error(Vendor::Saxon, source)?;
                        Ok(Handle::new(source.to_string()))
                    }),
                )
                .export::<saxon::Load>(
                    &format!("saxon::s9api::{}::{}", executable, load),
                    Arc::new(|executable: &mut Handle| -> NativeResult<Handle> {
                        let source = executable
                            .downcast_ref::<String>()
                            .cloned()
                            .ok_or_else(|| Fault::Internal("not an executable".into()))?;
                        Ok(Handle::new(Script {
                            source,
                            ..Script::default()
                        }))
                    }),
                )
                .export::<saxon::SetVariable>(
                    &format!("saxon::s9api::{}::{}", evaluator, set_variable),
                    Arc::new(|eval: &mut Handle, name: &str, item: &Handle| -> NativeResult<()> {
                        let item = value(item)?;
                        script(eval)?.variables.insert(name.to_string(), item);
                        Ok(())
                    }),
                )
                .export::<saxon::SetContext>(
                    &format!("saxon::s9api::{}::{}", evaluator, set_context),
                    Arc::new(|eval: &mut Handle, item: &Handle| -> NativeResult<()> {
                        let item = value(item)?;
                        script(eval)?.context = Some(item);
                        Ok(())
                    }),
                )
                .export::<saxon::Iterate>(
                    &format!("saxon::s9api::{}::{}", evaluator, iterate),
                    Arc::new(move |eval: &mut Handle| -> NativeResult<Handle> {
                        execute_recorder.record("query.execute");
                        Ok(Handle::new(evaluate(Vendor::Saxon, script(eval)?, &gate)?))
                    }),
                );
        }
        unit.into_unit()
    }
}

/// Loads the fake BaseX unit for any path, remembering the config bytes.
pub struct FakeLoader {
    pub fake: Fake,
    pub configs: Mutex<Vec<Option<Vec<u8>>>>,
}

impl FakeLoader {
    pub fn new(fake: Fake) -> Self {
        Self {
            fake,
            configs: Mutex::new(Vec::new()),
        }
    }
}

impl UnitLoader for FakeLoader {
    fn load(&self, _path: &Path, config: Option<&[u8]>) -> Result<Arc<dyn LoadingUnit>> {
        self.configs.lock().push(config.map(<[u8]>::to_vec));
        Ok(self.fake.basex_unit(&[]))
    }
}
