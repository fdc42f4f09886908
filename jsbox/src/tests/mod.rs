mod utils;

use std::time::Duration;

use crate::tests::fixtures::scripts;
use crate::tests::utils::defaults::{default_test_limits, default_timeout, extended_timeout};
use crate::tests::utils::skip_if_not_available;
use crate::{
    BufferSink, Error, EvalRequest, EvalService, EvalStatus, ResourceLimits, Sandbox,
};

fn print_sandbox() -> (Sandbox, BufferSink) {
    let mut sandbox = Sandbox::with_limits(default_test_limits());
    sandbox.allow_print_functions(true);
    sandbox.set_eval_timeout(default_timeout());
    let sink = BufferSink::new();
    sandbox.set_writer(sink.clone());
    (sandbox, sink)
}

fn request(code: &str, timeout: Duration) -> EvalRequest {
    EvalRequest {
        code: code.to_string(),
        input: None,
        globals: Default::default(),
        capabilities: None,
        timeout,
    }
}

#[tokio::test]
async fn test_print_reaches_sink() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    let outcome = sandbox.eval(scripts::PRINT_HI).await?;
    assert_eq!(sink.contents(), "Hi there!\n");
    assert_eq!(outcome.value, None);
    Ok(())
}

#[tokio::test]
async fn test_print_preserves_call_order() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    sandbox.eval(scripts::PRINT_TWICE).await?;
    assert_eq!(sink.contents(), "one\ntwo\n");
    Ok(())
}

#[tokio::test]
async fn test_print_joins_arguments_with_space() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    sandbox.eval(scripts::PRINT_JOINED).await?;
    assert_eq!(sink.contents(), "Hi there!\n");
    Ok(())
}

#[tokio::test]
async fn test_print_toggle_is_idempotent() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    // Same value twice must be indistinguishable from once
    sandbox.allow_print_functions(true);
    sandbox.eval(scripts::PRINT_HI).await?;
    assert_eq!(sink.contents(), "Hi there!\n");
    Ok(())
}

#[tokio::test]
async fn test_print_ungranted_is_undefined() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let mut sandbox = Sandbox::with_limits(default_test_limits());
    sandbox.set_eval_timeout(default_timeout());
    let sink = BufferSink::new();
    sandbox.set_writer(sink.clone());

    let result = sandbox.eval(scripts::PRINT_HI).await;
    assert!(matches!(result, Err(Error::EvaluationFailed(_))));
    assert!(sink.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sink_rebinding_routes_to_new_sink() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, first) = print_sandbox();
    sandbox.eval(scripts::PRINT_TWICE).await?;

    let second = BufferSink::new();
    sandbox.set_writer(second.clone());
    sandbox.eval(scripts::PRINT_HI).await?;

    assert_eq!(first.contents(), "one\ntwo\n");
    assert_eq!(second.contents(), "Hi there!\n");
    Ok(())
}

#[tokio::test]
async fn test_completion_value() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    let outcome = sandbox.eval(scripts::COMPLETION_VALUE).await?;
    assert_eq!(outcome.value.as_deref(), Some("42"));
    Ok(())
}

#[tokio::test]
async fn test_statement_has_no_completion_value() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    let outcome = sandbox.eval("const x = 1;").await?;
    assert_eq!(outcome.value, None);
    Ok(())
}

#[tokio::test]
async fn test_injected_globals_are_visible() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    sandbox.inject("answer", serde_json::json!(41));
    let outcome = sandbox.eval(scripts::USES_INJECTED).await?;
    assert_eq!(outcome.value.as_deref(), Some("42"));
    Ok(())
}

#[tokio::test]
async fn test_exit_function_ends_evaluation() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    sandbox.allow_exit_functions(true);
    let outcome = sandbox.eval(scripts::EXIT_CLEANLY).await?;
    assert_eq!(sink.contents(), "before\n");
    assert_eq!(outcome.value, None);
    Ok(())
}

#[tokio::test]
async fn test_exit_ungranted_is_undefined() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    let result = sandbox.eval(scripts::QUIT_UNGRANTED).await;
    assert!(matches!(result, Err(Error::EvaluationFailed(_))));
    Ok(())
}

#[tokio::test]
async fn test_read_line_consumes_input() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    sandbox.allow_read_functions(true);
    sandbox.set_input("Test User");
    sandbox.eval(scripts::GREET_INPUT).await?;
    assert_eq!(sink.contents(), "Hello, Test User!\n");
    Ok(())
}

#[tokio::test]
async fn test_read_line_returns_null_at_exhaustion() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    sandbox.allow_read_functions(true);
    sandbox.set_input("only line");
    sandbox.eval(scripts::READ_PAST_INPUT).await?;
    assert_eq!(sink.contents(), "null\n");
    Ok(())
}

#[tokio::test]
async fn test_syntax_error_is_evaluation_failure() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    match sandbox.eval(scripts::SYNTAX_ERROR).await {
        Err(Error::EvaluationFailed(message)) => {
            assert!(message.contains("SyntaxError"), "got: {}", message);
        }
        other => panic!("Expected evaluation failure, got {:?}", other.map(|o| o.value)),
    }
    Ok(())
}

#[tokio::test]
async fn test_runtime_throw_is_evaluation_failure() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    match sandbox.eval(scripts::THROWING).await {
        Err(Error::EvaluationFailed(message)) => {
            assert!(message.contains("boom"), "got: {}", message);
        }
        other => panic!("Expected evaluation failure, got {:?}", other.map(|o| o.value)),
    }
    Ok(())
}

#[tokio::test]
async fn test_partial_output_survives_failure() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, sink) = print_sandbox();
    let result = sandbox.eval(scripts::PRINT_THEN_THROW).await;
    assert!(matches!(result, Err(Error::EvaluationFailed(_))));
    assert_eq!(sink.contents(), "first\n");
    Ok(())
}

#[tokio::test]
async fn test_wall_clock_budget() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    sandbox.set_eval_timeout(Duration::from_secs(1));
    let result = sandbox.eval(scripts::BUSY_LOOP).await;
    assert!(matches!(result, Err(Error::ResourceExceeded(_))));
    Ok(())
}

#[tokio::test]
async fn test_cpu_budget() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let (mut sandbox, _sink) = print_sandbox();
    sandbox.set_max_cpu_time(1);
    sandbox.set_eval_timeout(extended_timeout());
    let result = sandbox.eval(scripts::BUSY_LOOP).await;
    assert!(matches!(result, Err(Error::ResourceExceeded(_))));
    Ok(())
}

#[tokio::test]
async fn test_memory_budget() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let mut sandbox = Sandbox::with_limits(ResourceLimits {
        memory: 64 * 1024 * 1024,
        ..default_test_limits()
    });
    sandbox.set_eval_timeout(extended_timeout());
    let result = sandbox.eval(scripts::ALLOC_HEAVY).await;
    assert!(matches!(result, Err(Error::ResourceExceeded(_))));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_evaluations() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let service = EvalService::new(3, default_test_limits()).await?;

    let mut handles = vec![];
    for script in [scripts::PRINT_HI, scripts::PRINT_TWICE, scripts::PRINT_JOINED] {
        let service = service.clone();
        let req = request(script, default_timeout());
        handles.push(tokio::spawn(async move { service.evaluate(req).await }));
    }

    for handle in handles {
        let report = handle.await.unwrap()?;
        assert_eq!(report.status, EvalStatus::Success);
        assert!(!report.output.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_available_slots() -> Result<(), Error> {
    let max_evals = 2;
    let service = EvalService::new(max_evals, default_test_limits()).await?;
    assert_eq!(service.get_available_slots(), max_evals);
    Ok(())
}

#[tokio::test]
async fn test_service_folds_script_failure() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let service = EvalService::new(1, default_test_limits()).await?;
    let report = service
        .evaluate(request(scripts::PRINT_THEN_THROW, default_timeout()))
        .await?;
    assert_eq!(report.status, EvalStatus::EvaluationError);
    assert_eq!(report.output, "first\n");
    assert!(report.error.unwrap().contains("late failure"));
    Ok(())
}

#[tokio::test]
async fn test_service_reports_resource_exhaustion() -> Result<(), Error> {
    if skip_if_not_available(&["node"]) {
        return Ok(());
    }
    let service = EvalService::new(1, default_test_limits()).await?;
    let report = service
        .evaluate(request(scripts::BUSY_LOOP, Duration::from_secs(1)))
        .await?;
    assert_eq!(report.status, EvalStatus::ResourceExceeded);
    assert!(report.error.is_some());
    Ok(())
}
