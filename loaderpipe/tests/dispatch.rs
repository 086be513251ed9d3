//! Read, save and remove through a context adapter

mod common;

use std::sync::Arc;

use common::Harness;
use hamcrest::assert_that;
use hamcrest::prelude::*;
use loaderpipe::{
    Callback, JsonResponseParser, LoaderPipeline, Outcome, Pipe, PipeError, PipeHandler,
    PipeType, PipelineError, ReadFilter, RequestBuilder,
};
use loaderpipe_mocked::{two_widgets, MemoryPipeHandler, RecordingCallback, Widget};

fn widgets_pipe(handler: &Arc<MemoryPipeHandler>) -> Pipe<Widget> {
    Pipe::json(PipeType::Local, Arc::clone(handler) as Arc<dyn PipeHandler>)
}

#[test]
fn test_read_delivers_once_on_consumer_thread() {
    common::init_tracing();
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::with_documents(two_widgets()));
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb = RecordingCallback::<Vec<Widget>>::new().shared();
    adapter.read(Arc::clone(&cb) as Arc<dyn Callback<Vec<Widget>>>).unwrap();

    assert_that!(h.pump_one(), is(equal_to(1)));
    assert_that!(h.pump_quiet(), is(equal_to(0)));

    let deliveries = cb.deliveries();
    assert_that!(deliveries.len(), is(equal_to(1)));
    assert_eq!(deliveries[0].thread, std::thread::current().id());
    let items = deliveries[0].outcome.clone().unwrap();
    assert_eq!(
        items,
        vec![
            Widget::new("sprocket", "red").with_id(1),
            Widget::new("gear", "blue").with_id(2),
        ]
    );
    assert_that!(store.calls(), is(equal_to(1)));
}

#[test]
fn test_read_with_filter_passes_filter_to_handler() {
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::with_documents(two_widgets()));
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb = RecordingCallback::<Vec<Widget>>::new().shared();
    adapter
        .read_with_filter(
            ReadFilter::new().where_eq("color", "blue"),
            Arc::clone(&cb) as Arc<dyn Callback<Vec<Widget>>>,
        )
        .unwrap();

    assert_eq!(h.pump_one(), 1);
    assert_eq!(cb.values(), vec![vec![Widget::new("gear", "blue").with_id(2)]]);
}

#[test]
fn test_read_without_filter_is_the_same_operation_as_read() {
    let h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::new());
    store.hold();
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb: Arc<dyn Callback<Vec<Widget>>> = RecordingCallback::<Vec<Widget>>::new().shared();
    let plain = adapter.read(Arc::clone(&cb)).unwrap();
    let unfiltered = adapter.read_filtered(None, Arc::clone(&cb)).unwrap();
    let filtered = adapter
        .read_with_filter(ReadFilter::new().limit(1), cb)
        .unwrap();

    assert_eq!(plain, unfiltered);
    assert_ne!(plain, filtered);
    store.release();
}

#[test]
fn test_save_delivers_stored_item() {
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::with_documents(two_widgets()));
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb = RecordingCallback::<Widget>::new().shared();
    adapter
        .save(
            &Widget::new("bolt", "green"),
            Arc::clone(&cb) as Arc<dyn Callback<Widget>>,
        )
        .unwrap();

    assert_eq!(h.pump_one(), 1);
    assert_eq!(cb.values(), vec![Widget::new("bolt", "green").with_id(3)]);
    assert_that!(store.documents().len(), is(equal_to(3)));
}

#[test]
fn test_remove_missing_item_fails_once() {
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::with_documents(two_widgets()));
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb = RecordingCallback::<()>::new().shared();
    adapter
        .remove("42", Arc::clone(&cb) as Arc<dyn Callback<()>>)
        .unwrap();

    assert_eq!(h.pump_one(), 1);
    assert_eq!(h.pump_quiet(), 0);
    assert_that!(cb.successes(), is(equal_to(0)));
    assert_eq!(cb.failures(), vec![PipeError::NotFound("42".to_string())]);
}

#[test]
fn test_remove_existing_item_succeeds() {
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::with_documents(two_widgets()));
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb = RecordingCallback::<()>::new().shared();
    adapter.remove("1", Arc::clone(&cb) as Arc<dyn Callback<()>>).unwrap();

    assert_eq!(h.pump_one(), 1);
    assert_eq!(cb.successes(), 1);
    assert_eq!(store.documents().len(), 1);
}

#[test]
fn test_handler_failure_reaches_on_failure() {
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::new());
    store.fail_next(PipeError::Status {
        code: 503,
        message: "unavailable".to_string(),
    });
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb = RecordingCallback::<Vec<Widget>>::new().shared();
    adapter.read(Arc::clone(&cb) as Arc<dyn Callback<Vec<Widget>>>).unwrap();

    assert_eq!(h.pump_one(), 1);
    assert_eq!(cb.successes(), 0);
    assert_eq!(
        cb.failures(),
        vec![PipeError::Status {
            code: 503,
            message: "unavailable".to_string()
        }]
    );
}

#[test]
fn test_undecodable_response_is_a_codec_failure() {
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::with_documents(vec![
        serde_json::json!({"id": 1, "name": "no color"}),
    ]));
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe("widgets", widgets_pipe(&store));

    let cb = RecordingCallback::<Vec<Widget>>::new().shared();
    adapter.read(Arc::clone(&cb) as Arc<dyn Callback<Vec<Widget>>>).unwrap();

    assert_eq!(h.pump_one(), 1);
    let failures = cb.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], PipeError::Codec(_)), "{:?}", failures[0]);
}

struct ExplodingHandler;

impl PipeHandler for ExplodingHandler {
    fn on_read(&self, _filter: Option<&ReadFilter>) -> Outcome<Vec<u8>> {
        panic!("socket on fire")
    }

    fn on_save(&self, _body: &[u8]) -> Outcome<Vec<u8>> {
        panic!("socket on fire")
    }

    fn on_remove(&self, _id: &str) -> Outcome<()> {
        panic!("socket on fire")
    }
}

#[test]
fn test_handler_panic_becomes_failure() {
    let mut h = Harness::new();
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe(
        "widgets",
        Pipe::<Widget>::json(PipeType::Rest, Arc::new(ExplodingHandler)),
    );

    let cb = RecordingCallback::<()>::new().shared();
    adapter.remove("7", Arc::clone(&cb) as Arc<dyn Callback<()>>).unwrap();

    assert_eq!(h.pump_one(), 1);
    assert_eq!(
        cb.failures(),
        vec![PipeError::Panicked("socket on fire".to_string())]
    );
}

struct RejectingBuilder;

impl RequestBuilder<Widget> for RejectingBuilder {
    fn body(&self, item: &Widget) -> Result<Vec<u8>, PipeError> {
        Err(PipeError::Codec(format!("cannot encode {}", item.name)))
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

#[test]
fn test_save_encode_failure_is_reported_at_dispatch() {
    let mut h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::new());
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe(
        "widgets",
        Pipe::<Widget>::with_codecs(
            PipeType::Local,
            Arc::clone(&store) as Arc<dyn PipeHandler>,
            Arc::new(RejectingBuilder),
            Arc::new(JsonResponseParser::new()),
        ),
    );

    let cb = RecordingCallback::<Widget>::new().shared();
    let result = adapter.save(
        &Widget::new("bolt", "green"),
        Arc::clone(&cb) as Arc<dyn Callback<Widget>>,
    );

    assert!(
        matches!(result, Err(PipelineError::Encode(PipeError::Codec(_)))),
        "{result:?}"
    );
    assert!(h.manager.is_empty());
    assert!(adapter.registered_ids().is_empty());
    assert_eq!(h.pump_quiet(), 0);
    assert_eq!(store.calls(), 0);
    assert_eq!(cb.calls(), 0);
}

#[test]
fn test_adapter_exposes_its_pipe() {
    let h = Harness::new();
    let store = Arc::new(MemoryPipeHandler::new());
    let pipeline = LoaderPipeline::for_context(h.task_manager(), h.handler.clone());
    let adapter = pipeline.pipe(
        "widgets",
        widgets_pipe(&store).with_url("https://example.test/widgets"),
    );

    assert_eq!(adapter.name(), "widgets");
    assert_eq!(adapter.pipe_type(), &PipeType::Local);
    assert_eq!(adapter.url(), Some("https://example.test/widgets"));
    assert_eq!(adapter.request_builder().content_type(), "application/json");
}
