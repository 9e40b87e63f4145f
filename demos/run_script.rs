//! Compile and run scripts against live host objects
//!
//! Run with: cargo run --example run_script

use std::time::Duration;

use scriptrunner::{
    DependencyBag, Exception, HostObject, ReferenceSet, ScriptHost, SourceUnit, Task, Value,
};

/// Host object with an asynchronous and a synchronous writer
struct TestClass;

impl HostObject for TestClass {
    fn type_name(&self) -> &str {
        "TestClass"
    }

    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, Exception> {
        let text = args.iter().map(|a| a.to_string()).collect::<String>();
        match name {
            "write1" => Ok(Value::Task(Task::new(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                println!("  [TestClass.write1] {}", text);
                Ok(Value::Null)
            }))),
            "write2" => {
                println!("  [TestClass.write2] {}", text);
                Ok(Value::Null)
            }
            _ => Err(Exception::member_not_found(self.type_name(), name)),
        }
    }
}

/// Host object that hands out a message
struct OtherClass;

impl HostObject for OtherClass {
    fn type_name(&self) -> &str {
        "OtherClass"
    }

    fn call_method(&self, name: &str, _args: &[Value]) -> Result<Value, Exception> {
        match name {
            "get_message" => Ok(Value::from("Hello from OtherClass")),
            _ => Err(Exception::member_not_found(self.type_name(), name)),
        }
    }
}

const GOOD_SCRIPT: &str = r#"
(defclass Script (deps)
  (defmethod process ()
    (define test (. deps testObject))
    (define other (. deps otherObject))
    (await (call test write1 (str "Message: " (. deps message))))
    (call test write2 (call other get_message))
    (print "script finished")))
"#;

const BROKEN_SCRIPT: &str = r#"
(defclass Script (deps)
  (defmethod process ()
    (undefined_function (. deps message))))
"#;

const FAILING_SCRIPT: &str = r#"
(defclass Script (deps)
  (defmethod process ()
    (try
      (call (. deps testObject) write3 "never")
      (catch e (throw (error "ScriptError" "writer call failed" e))))))
"#;

fn bag() -> DependencyBag {
    DependencyBag::new()
        .with("message", "HELLO!")
        .with_host("testObject", TestClass)
        .with_host("otherObject", OtherClass)
}

fn run(host: &ScriptHost, title: &str, source: &str) -> anyhow::Result<()> {
    println!("{}", title);
    println!("─────────────────────────────────────");

    let report = host.run(&SourceUnit::new(source), &bag())?;
    println!("{}", report.compilation_report());
    if let Some(execution) = report.execution_report() {
        println!("{}", execution);
    }
    println!();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    println!("═══════════════════════════════════════");
    println!("  Scriptrunner {} - run_script", scriptrunner::VERSION);
    println!("═══════════════════════════════════════\n");

    let host = ScriptHost::new(ReferenceSet::standard())?;

    run(&host, "Example 1: host objects and an awaited task", GOOD_SCRIPT)?;
    run(&host, "Example 2: compilation failure", BROKEN_SCRIPT)?;
    run(&host, "Example 3: execution failure with a cause chain", FAILING_SCRIPT)?;

    println!("Units still resident: {}", host.live_units());
    Ok(())
}
