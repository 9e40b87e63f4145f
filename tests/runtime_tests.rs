//! Run-time behavior: construction, tasks, timeouts and load-time verification

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scriptrunner::compiler::{emit, Instruction};
use scriptrunner::loader::{self, LoadError};
use scriptrunner::{
    CompileOptions, DependencyBag, Error, Exception, ExecutionOutcome, HostObject, InvokeOptions,
    ReferenceSet, ScriptHost, SourceUnit, Task, Value,
};

fn run(source: &str, bag: DependencyBag) -> ExecutionOutcome {
    run_with(source, bag, InvokeOptions::default())
}

fn run_with(source: &str, bag: DependencyBag, options: InvokeOptions) -> ExecutionOutcome {
    let host =
        ScriptHost::with_options(ReferenceSet::standard(), CompileOptions::default(), options)
            .unwrap();
    let report = host.run(&SourceUnit::new(source), &bag).unwrap();
    assert!(
        report.compilation.is_success(),
        "{}",
        report.compilation_report()
    );
    report.outcome.unwrap()
}

/// Host object whose methods return tasks
#[derive(Clone, Default)]
struct Worker {
    log: Arc<Mutex<Vec<String>>>,
}

impl HostObject for Worker {
    fn type_name(&self) -> &str {
        "Worker"
    }

    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, Exception> {
        match name {
            "compute" => {
                let n = args.first().cloned().unwrap_or(Value::Null).as_int()?;
                Ok(Value::Task(Task::new(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(Value::Int(n * 2))
                })))
            }
            "write" => {
                let log = self.log.clone();
                let line = args.iter().map(|a| a.to_string()).collect::<String>();
                Ok(Value::Task(Task::new(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    log.lock().push(line);
                    Ok(Value::Null)
                })))
            }
            "fail" => Ok(Value::Task(Task::new(async move {
                Err(Exception::new("WriteFailed", "disk full"))
            }))),
            _ => Err(Exception::member_not_found(self.type_name(), name)),
        }
    }
}

#[test]
fn test_await_host_task() {
    let outcome = run(
        r#"
        (defclass Script (deps)
          (defmethod process ()
            (+ (await (call (. deps worker) compute 20)) 2)))
        "#,
        DependencyBag::new().with_host("worker", Worker::default()),
    );
    assert_eq!(outcome.result(), Some(&Value::Int(42)));
}

#[test]
fn test_returned_task_is_awaited_by_invoker() {
    let outcome = run(
        "(defclass Script (deps) (defmethod process () (call (. deps worker) compute 4)))",
        DependencyBag::new().with_host("worker", Worker::default()),
    );
    assert_eq!(outcome.result(), Some(&Value::Int(8)));
}

#[test]
fn test_unawaited_tasks_are_drained() {
    let worker = Worker::default();
    let outcome = run(
        r#"
        (defclass Script (deps)
          (defmethod process ()
            (define w (. deps worker))
            (call w write "one")
            (call w write "two")
            "returned"))
        "#,
        DependencyBag::new().with_host("worker", worker.clone()),
    );

    assert_eq!(outcome.result(), Some(&Value::from("returned")));
    assert_eq!(
        *worker.log.lock(),
        vec!["one".to_string(), "two".to_string()]
    );
}

#[test]
fn test_failed_fire_and_forget_task_fails_the_invocation() {
    let outcome = run(
        "(defclass Script (deps) (defmethod process () (call (. deps worker) fail) 1))",
        DependencyBag::new().with_host("worker", Worker::default()),
    );
    let outermost = outcome.outermost().unwrap();
    assert_eq!(outermost.type_name, "WriteFailed");
    assert_eq!(outermost.message, "disk full");
}

#[test]
fn test_all_combines_tasks() {
    let outcome = run(
        r#"
        (defclass Script (deps)
          (defmethod process ()
            (define w (. deps worker))
            (await (all (call w compute 1) (call w compute 2) (completed 3)))))
        "#,
        DependencyBag::new().with_host("worker", Worker::default()),
    );
    assert_eq!(
        outcome.result(),
        Some(&Value::array(vec![Value::Int(2), Value::Int(4), Value::Int(3)]))
    );
}

#[test]
fn test_one_task_can_be_awaited_by_many_waiters() {
    let outcome = run(
        r#"
        (defclass Script (deps)
          (defmethod process ()
            (define w (. deps worker))
            (define t (call w compute 5))
            (define u (call w compute 5))
            (define pair (await (all t t)))
            (define nested (await (all (all u) (all u))))
            (list pair nested (await t))))
        "#,
        DependencyBag::new().with_host("worker", Worker::default()),
    );

    let ten = Value::Int(10);
    let pair = Value::array(vec![ten.clone(), ten.clone()]);
    let nested = Value::array(vec![
        Value::array(vec![ten.clone()]),
        Value::array(vec![ten.clone()]),
    ]);
    assert_eq!(
        outcome.result(),
        Some(&Value::array(vec![pair, nested, ten]))
    );
}

#[test]
fn test_constructor_failure_is_captured() {
    let outcome = run(
        r#"
        (defclass Script (deps)
          (field settings (. deps settings))
          (defmethod process () settings))
        "#,
        DependencyBag::new(),
    );
    assert!(!outcome.is_success());
    assert_eq!(outcome.outermost().unwrap().type_name, "MemberNotFound");

    let outcome = run(
        r#"
        (defclass Script (deps)
          (init (throw (error "ConfigError" "no settings")))
          (defmethod process () 1))
        "#,
        DependencyBag::new(),
    );
    assert_eq!(outcome.cause_chain().len(), 1);
    assert_eq!(outcome.outermost().unwrap().type_name, "ConfigError");
}

#[test]
fn test_timeout_stops_a_busy_loop() {
    let started = Instant::now();
    let outcome = run_with(
        r#"
        (defclass Script (deps)
          (defmethod process ()
            (define n 0)
            (try
              (while true (set! n (+ n 1)))
              (catch e "caught"))))
        "#,
        DependencyBag::new(),
        InvokeOptions::default().timeout(Duration::from_millis(50)),
    );

    assert_eq!(outcome.outermost().unwrap().type_name, "Timeout");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_timeout_while_waiting_on_a_task() {
    let started = Instant::now();
    let outcome = run_with(
        "(defclass Script (deps) (defmethod process () (await (delay 10000)) 1))",
        DependencyBag::new(),
        InvokeOptions::default().timeout(Duration::from_millis(50)),
    );

    assert_eq!(outcome.outermost().unwrap().type_name, "Timeout");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_runtime_errors_are_catchable() {
    let outcome = run(
        r#"
        (defclass Script (deps)
          (defmethod process ()
            (try
              (/ (. deps n) 0)
              (catch e (str (. e type) ": " (. e message))))))
        "#,
        DependencyBag::new().with("n", 1),
    );
    assert_eq!(
        outcome.result(),
        Some(&Value::from("DivideByZero: Attempted to divide by zero"))
    );
}

#[test]
fn test_tampered_binary_is_rejected() {
    let host = ScriptHost::new(ReferenceSet::standard()).unwrap();
    let (_, compilation) = host
        .compile(&SourceUnit::new(
            "(defclass Script (deps) (defmethod process () (str \"a\" \"b\")))",
        ))
        .unwrap();
    let binary = compilation.binary().unwrap();

    let mut flipped = binary.to_vec();
    let last = flipped.len() - 3;
    flipped[last] ^= 0x01;
    assert!(matches!(
        host.load(&flipped),
        Err(Error::Load(LoadError::Malformed(_)))
    ));

    // A consistent checksum over bad bytecode is caught by the verifier
    let mut unit = loader::decode(binary).unwrap();
    unit.types[0].methods[0]
        .chunk
        .code
        .insert(0, Instruction::Jump(10_000));
    let forged = emit::encode(&unit).unwrap();
    assert!(matches!(
        host.load(&forged),
        Err(Error::Load(LoadError::InvalidBytecode { .. }))
    ));
}
