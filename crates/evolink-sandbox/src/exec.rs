//! In-process execution of a linked image
//!
//! Interprets the client's `main()` with the substitute artifact bound in
//! place of the baseline: non-captured dependency references dispatch into
//! the substitute's code section, captured bodies and literals evaluate
//! locally, method calls dispatch virtually on the receiver's runtime
//! class. Module state initializes dependency-first, in declaration order.
//!
//! Used directly by unit tests and by the `exec-image` subprocess mode;
//! the process sandbox wraps it with isolation and a timeout.

use crate::image::LinkedImage;
use evolink_artifact::{
    Artifact, Body, ClassCode, ClassRef, Diagnostic, DiagnosticOrigin, Expr, FunctionCode,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Recursion bound; ulib has no loops, so runaway recursion is the only
/// way an image fails to terminate in-process.
const MAX_DEPTH: usize = 128;

/// What an execution attempt produced.
///
/// Serialized across the `exec-image` process boundary, so the parent can
/// reconstruct the verdict from the child's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    /// Zero on clean completion, one on a runtime fault.
    pub exit_code: i32,
    /// Everything the image printed, in order.
    pub stdout: String,
    /// Runtime faults, tagged with the execute stage.
    pub diagnostics: Vec<Diagnostic>,
}

/// Run a linked image to completion in the current process.
#[must_use]
pub fn execute(image: &LinkedImage) -> ExecOutcome {
    let mut interp = Interp::new(image.client(), image.substitute());
    match interp.boot() {
        Ok(()) => ExecOutcome {
            exit_code: 0,
            stdout: interp.stdout,
            diagnostics: Vec::new(),
        },
        Err(fault) => ExecOutcome {
            exit_code: 1,
            stdout: interp.stdout,
            diagnostics: vec![Diagnostic::error(DiagnosticOrigin::Execute, fault.0)],
        },
    }
}

/// A runtime fault; rendered as one execute-origin diagnostic.
struct Fault(String);

/// Which artifact's code is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Substitute,
}

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Str(String),
    Unit,
    Instance(Rc<RefCell<Instance>>),
}

#[derive(Debug)]
struct Instance {
    /// Runtime class, the dispatch root.
    class: (Side, String),
    fields: HashMap<String, Value>,
}

#[derive(Debug)]
enum Slot {
    /// Declared `lateinit`, not yet written.
    Uninitialized,
    Value(Value),
}

struct Frame {
    side: Side,
    params: HashMap<String, Value>,
    receiver: Option<Rc<RefCell<Instance>>>,
}

struct Interp<'a> {
    client: &'a Artifact,
    substitute: &'a Artifact,
    client_state: HashMap<String, Slot>,
    substitute_state: HashMap<String, Slot>,
    stdout: String,
    depth: usize,
}

impl<'a> Interp<'a> {
    fn new(client: &'a Artifact, substitute: &'a Artifact) -> Self {
        Self {
            client,
            substitute,
            client_state: HashMap::new(),
            substitute_state: HashMap::new(),
            stdout: String::new(),
            depth: 0,
        }
    }

    fn artifact(&self, side: Side) -> &'a Artifact {
        match side {
            Side::Client => self.client,
            Side::Substitute => self.substitute,
        }
    }

    fn state(&self, side: Side) -> &HashMap<String, Slot> {
        match side {
            Side::Client => &self.client_state,
            Side::Substitute => &self.substitute_state,
        }
    }

    fn state_mut(&mut self, side: Side) -> &mut HashMap<String, Slot> {
        match side {
            Side::Client => &mut self.client_state,
            Side::Substitute => &mut self.substitute_state,
        }
    }

    fn boot(&mut self) -> Result<(), Fault> {
        self.init_module(Side::Substitute)?;
        self.init_module(Side::Client)?;
        let Some(entry) = self.client.entry() else {
            return Err(Fault("program has no entry point".into()));
        };
        self.call(Side::Client, entry, Vec::new(), None)?;
        Ok(())
    }

    fn init_module(&mut self, side: Side) -> Result<(), Fault> {
        let code = self.artifact(side).code();
        for (key, prop) in &code.properties {
            if prop.lateinit {
                self.state_mut(side).insert(key.clone(), Slot::Uninitialized);
                continue;
            }
            let Some(init) = &prop.initializer else {
                return Err(Fault(format!("property `{key}` has no initializer")));
            };
            let frame = Frame {
                side,
                params: HashMap::new(),
                receiver: None,
            };
            let value = self.eval(init, &frame)?;
            self.state_mut(side).insert(key.clone(), Slot::Value(value));
        }
        Ok(())
    }

    fn eval(&mut self, expr: &'a Expr, frame: &Frame) -> Result<Value, Fault> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Param(name) => frame
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| Fault(format!("unbound parameter `{name}`"))),
            Expr::Add(lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                match (lhs, rhs) {
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
                    (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
                    _ => Err(Fault("type error in `+`".into())),
                }
            }
            Expr::Print(inner) => {
                let value = self.eval(inner, frame)?;
                let line = match value {
                    Value::Int(v) => v.to_string(),
                    Value::Str(s) => s,
                    Value::Unit | Value::Instance(_) => {
                        return Err(Fault("print argument must be Int or Str".into()));
                    }
                };
                self.stdout.push_str(&line);
                self.stdout.push('\n');
                Ok(Value::Unit)
            }
            Expr::LocalCall { key, args } => {
                let func = self.function(frame.side, key)?;
                let args = self.eval_args(args, frame)?;
                self.call(frame.side, func, args, None)
            }
            Expr::LocalRead { key } => self.read_slot(frame.side, key),
            Expr::LocalWrite { key, value } => {
                let value = self.eval(value, frame)?;
                self.write_slot(frame.side, key, value)?;
                Ok(Value::Unit)
            }
            Expr::DepCall { import, args } => {
                let key = self.import_key(frame.side, *import)?;
                let func = self.function(Side::Substitute, &key)?;
                let args = self.eval_args(args, frame)?;
                self.call(Side::Substitute, func, args, None)
            }
            Expr::DepRead { import } => {
                let key = self.import_key(frame.side, *import)?;
                self.read_slot(Side::Substitute, &key)
            }
            Expr::DepWrite { import, value } => {
                let key = self.import_key(frame.side, *import)?;
                let value = self.eval(value, frame)?;
                self.write_slot(Side::Substitute, &key, value)?;
                Ok(Value::Unit)
            }
            Expr::Construct { class } => {
                let (side, name) = self.class_target(frame.side, class)?;
                self.instantiate(side, &name)
            }
            Expr::MethodCall { recv, key, args } => {
                let recv = self.eval(recv, frame)?;
                let args = self.eval_args(args, frame)?;
                self.dispatch(&recv, key, args)
            }
            Expr::FieldRead { recv, field } => {
                let recv = self.eval(recv, frame)?;
                let Value::Instance(instance) = recv else {
                    return Err(Fault(format!("field `{field}` read on a non-instance value")));
                };
                let value = instance.borrow().fields.get(field).cloned();
                value.ok_or_else(|| Fault(format!("instance has no field `{field}`")))
            }
            Expr::SelfField { field } => {
                let Some(receiver) = &frame.receiver else {
                    return Err(Fault(format!("field `{field}` read outside a method")));
                };
                let value = receiver.borrow().fields.get(field).cloned();
                value.ok_or_else(|| Fault(format!("instance has no field `{field}`")))
            }
            Expr::SelfCall { key, args } => {
                let Some(receiver) = frame.receiver.clone() else {
                    return Err(Fault(format!("method `{key}` called outside a method")));
                };
                let args = self.eval_args(args, frame)?;
                self.dispatch(&Value::Instance(receiver), key, args)
            }
            Expr::Captured { params, body, args } => {
                let args = self.eval_args(args, frame)?;
                let mut bound = HashMap::with_capacity(args.len());
                for (name, value) in params.iter().zip(args) {
                    bound.insert(name.clone(), value);
                }
                let inner = Frame {
                    side: frame.side,
                    params: bound,
                    receiver: None,
                };
                self.run_body(body, &inner)
            }
        }
    }

    fn eval_args(&mut self, args: &'a [Expr], frame: &Frame) -> Result<Vec<Value>, Fault> {
        args.iter().map(|arg| self.eval(arg, frame)).collect()
    }

    fn call(
        &mut self,
        side: Side,
        func: &'a FunctionCode,
        args: Vec<Value>,
        receiver: Option<Rc<RefCell<Instance>>>,
    ) -> Result<Value, Fault> {
        if self.depth >= MAX_DEPTH {
            return Err(Fault("maximum call depth exceeded".into()));
        }
        let Some(body) = &func.body else {
            return Err(Fault("abstract function invoked".into()));
        };
        if func.params.len() != args.len() {
            return Err(Fault(format!(
                "arity mismatch: expected {} arguments, got {}",
                func.params.len(),
                args.len()
            )));
        }
        let mut params = HashMap::with_capacity(args.len());
        for (name, value) in func.params.iter().zip(args) {
            params.insert(name.clone(), value);
        }
        let frame = Frame {
            side,
            params,
            receiver,
        };
        self.depth += 1;
        let result = self.run_body(body, &frame);
        self.depth -= 1;
        result
    }

    fn run_body(&mut self, body: &'a Body, frame: &Frame) -> Result<Value, Fault> {
        match body {
            Body::Expr(expr) => self.eval(expr, frame),
            Body::Block(stmts) => {
                for stmt in stmts {
                    self.eval(stmt, frame)?;
                }
                Ok(Value::Unit)
            }
        }
    }

    fn function(&self, side: Side, key: &str) -> Result<&'a FunctionCode, Fault> {
        self.artifact(side)
            .code()
            .function(key)
            .ok_or_else(|| Fault(format!("missing function `{key}` at runtime")))
    }

    fn import_key(&self, side: Side, index: usize) -> Result<String, Fault> {
        self.artifact(side)
            .imports()
            .get(index)
            .map(|record| record.key.clone())
            .ok_or_else(|| Fault(format!("import #{index} out of range")))
    }

    fn read_slot(&self, side: Side, key: &str) -> Result<Value, Fault> {
        match self.state(side).get(key) {
            Some(Slot::Value(value)) => Ok(value.clone()),
            Some(Slot::Uninitialized) => Err(Fault(format!(
                "lateinit property `{key}` accessed before initialization"
            ))),
            None => Err(Fault(format!("missing property `{key}` at runtime"))),
        }
    }

    fn write_slot(&mut self, side: Side, key: &str, value: Value) -> Result<(), Fault> {
        match self.state_mut(side).get_mut(key) {
            Some(slot) => {
                *slot = Slot::Value(value);
                Ok(())
            }
            None => Err(Fault(format!("missing property `{key}` at runtime"))),
        }
    }

    fn class_target(&self, side: Side, class: &'a ClassRef) -> Result<(Side, String), Fault> {
        match class {
            ClassRef::Local(name) => Ok((side, name.clone())),
            ClassRef::Dep { import } => {
                let key = self.import_key(side, *import)?;
                Ok((Side::Substitute, key))
            }
        }
    }

    fn class_code(&self, side: Side, name: &str) -> Result<&'a ClassCode, Fault> {
        self.artifact(side)
            .code()
            .class(name)
            .ok_or_else(|| Fault(format!("missing class `{name}` at runtime")))
    }

    /// Leaf-first inheritance chain starting at the given class.
    fn class_chain(&self, side: Side, name: &str) -> Result<Vec<(Side, String)>, Fault> {
        let mut chain = Vec::new();
        let mut current = (side, name.to_owned());
        loop {
            let code = self.class_code(current.0, &current.1)?;
            chain.push(current.clone());
            if chain.len() > 32 {
                return Err(Fault(format!("class hierarchy too deep at `{name}`")));
            }
            match &code.parent {
                None => break,
                Some(ClassRef::Local(parent)) => current = (current.0, parent.clone()),
                Some(ClassRef::Dep { import }) => {
                    let key = self.import_key(current.0, *import)?;
                    current = (Side::Substitute, key);
                }
            }
        }
        Ok(chain)
    }

    fn instantiate(&mut self, side: Side, name: &str) -> Result<Value, Fault> {
        let chain = self.class_chain(side, name)?;
        let instance = Rc::new(RefCell::new(Instance {
            class: (side, name.to_owned()),
            fields: HashMap::new(),
        }));
        // root first, so subclass initializers can read inherited fields
        for (cls_side, cls_name) in chain.iter().rev() {
            let class_code = self.class_code(*cls_side, cls_name)?;
            for (field, prop) in &class_code.fields {
                let Some(init) = &prop.initializer else {
                    return Err(Fault(format!("field `{cls_name}.{field}` has no initializer")));
                };
                let frame = Frame {
                    side: *cls_side,
                    params: HashMap::new(),
                    receiver: Some(Rc::clone(&instance)),
                };
                let value = self.eval(init, &frame)?;
                instance.borrow_mut().fields.insert(field.clone(), value);
            }
        }
        Ok(Value::Instance(instance))
    }

    /// Virtual dispatch: first implementation found walking leaf to root.
    fn dispatch(&mut self, recv: &Value, key: &str, args: Vec<Value>) -> Result<Value, Fault> {
        let Value::Instance(instance) = recv else {
            return Err(Fault(format!("method `{key}` called on a non-instance value")));
        };
        let start = instance.borrow().class.clone();
        let chain = self.class_chain(start.0, &start.1)?;
        for (side, class_name) in &chain {
            let class_code = self.class_code(*side, class_name)?;
            if let Some(method) = class_code.methods.get(key) {
                if method.body.is_some() {
                    return self.call(*side, method, args, Some(Rc::clone(instance)));
                }
            }
        }
        Err(Fault(format!(
            "no implementation of `{key}` in class `{}`",
            start.1
        )))
    }
}
