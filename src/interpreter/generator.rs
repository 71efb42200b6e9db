//! Resumable generator execution.
//!
//! A generator is an explicit state machine rather than a host coroutine:
//! it keeps its local environment, a stack of block frames (each a
//! statement slice, a cursor, and the loop it belongs to), and live loop
//! iterators. Advancing interprets statements until a `yield` produces a
//! value or the body runs out, which raises the internal stop-iteration
//! exception.
//!
//! `yield` is recognized as an expression statement, as the value of an
//! assignment (the resumed assignment target reads `None`), and as
//! `yield from`; yields directly inside nested `if`/`while`/`for` blocks
//! resume correctly.

use std::rc::Rc;

use crate::ast::expr::{ExprKind, ExprRef};
use crate::ast::stmt::{FunctionDef, StmtKind, StmtRef};
use crate::intern::Symbol;
use crate::value::Value;

use super::{Flow, Frame, Interpreter};

/// One resumable block: statements, cursor, and the loop driving it.
pub struct GenFrame<'a> {
    pub block: &'a [StmtRef<'a>],
    pub index: usize,
    pub looping: Option<LoopKind<'a>>,
}

pub enum LoopKind<'a> {
    While(ExprRef<'a>),
    For {
        target: ExprRef<'a>,
        items: Vec<Value<'a>>,
        pos: usize,
    },
    /// `yield from` drains a pre-collected sequence.
    YieldSeq { items: Vec<Value<'a>>, pos: usize },
}

/// Saved execution state of one generator object.
pub struct GeneratorState<'a> {
    pub def: &'a FunctionDef<'a>,
    pub env: Vec<(Symbol, Value<'a>)>,
    pub frames: Vec<GenFrame<'a>>,
    pub finished: bool,
    /// Assignment targets waiting for the resume value of `x = yield v`.
    pending_assign: Option<&'a [ExprRef<'a>]>,
}

impl<'a> GeneratorState<'a> {
    pub fn new(def: &'a FunctionDef<'a>, env: Vec<(Symbol, Value<'a>)>) -> Self {
        GeneratorState {
            def,
            env,
            frames: vec![GenFrame { block: def.body, index: 0, looping: None }],
            finished: false,
            pending_assign: None,
        }
    }
}

enum Step<'a> {
    Yield(Value<'a>),
    Done,
}

enum EndKind<'a> {
    Plain,
    While(ExprRef<'a>),
    For,
    Seq,
}

impl<'a, 'ctx> Interpreter<'a, 'ctx> {
    /// Advances the generator to its next yield. `None` means exhausted;
    /// exhaustion raises the stop-iteration exception, which iteration
    /// constructs clear.
    pub(crate) fn advance_generator(
        &mut self,
        gen: &Rc<std::cell::RefCell<GeneratorState<'a>>>,
    ) -> Option<Value<'a>> {
        let mut state = match gen.try_borrow_mut() {
            Ok(state) => state,
            Err(_) => {
                self.runtime_error("generator already executing");
                return None;
            }
        };
        if state.finished {
            self.raise_message(self.registry.stop_iteration_class, String::new());
            return None;
        }

        // Install the generator's locals as the current frame.
        let env = std::mem::take(&mut state.env);
        self.frames.push(Frame { env });

        // A suspended `x = yield v` resumes by binding the sent value,
        // which is always None in this synchronous core.
        if let Some(targets) = state.pending_assign.take() {
            for target in targets {
                self.assign_target(target, Value::None);
            }
        }

        let step = self.generator_step(&mut state);

        state.env = self.frames.pop().map(|frame| frame.env).unwrap_or_default();

        match step {
            Step::Yield(value) => Some(value),
            Step::Done => {
                state.finished = true;
                if self.exception.is_none() {
                    self.raise_message(self.registry.stop_iteration_class, String::new());
                }
                None
            }
        }
    }

    fn generator_step(&mut self, state: &mut GeneratorState<'a>) -> Step<'a> {
        loop {
            if self.exception.is_some() {
                return Step::Done;
            }

            // Block exhausted: loop bookkeeping or frame pop.
            let end = match state.frames.last() {
                None => return Step::Done,
                Some(frame) if frame.index >= frame.block.len() => Some(match &frame.looping {
                    None => EndKind::Plain,
                    Some(LoopKind::While(test)) => EndKind::While(*test),
                    Some(LoopKind::For { .. }) => EndKind::For,
                    Some(LoopKind::YieldSeq { .. }) => EndKind::Seq,
                }),
                Some(_) => None,
            };

            if let Some(end) = end {
                match end {
                    EndKind::Plain => {
                        state.frames.pop();
                    }
                    EndKind::While(test) => {
                        let value = self.eval(test);
                        if self.exception.is_some() {
                            return Step::Done;
                        }
                        if value.is_truthy() {
                            state.frames.last_mut().expect("frame present").index = 0;
                        } else {
                            state.frames.pop();
                        }
                    }
                    EndKind::For => {
                        let next = {
                            let frame = state.frames.last_mut().expect("frame present");
                            match &mut frame.looping {
                                Some(LoopKind::For { target, items, pos }) => {
                                    if *pos < items.len() {
                                        let item = items[*pos].clone();
                                        *pos += 1;
                                        frame.index = 0;
                                        Some((*target, item))
                                    } else {
                                        None
                                    }
                                }
                                _ => None,
                            }
                        };
                        match next {
                            Some((target, item)) => self.assign_target(target, item),
                            None => {
                                state.frames.pop();
                            }
                        }
                    }
                    EndKind::Seq => {
                        let next = {
                            let frame = state.frames.last_mut().expect("frame present");
                            match &mut frame.looping {
                                Some(LoopKind::YieldSeq { items, pos }) => {
                                    if *pos < items.len() {
                                        let item = items[*pos].clone();
                                        *pos += 1;
                                        Some(item)
                                    } else {
                                        None
                                    }
                                }
                                _ => None,
                            }
                        };
                        match next {
                            Some(item) => return Step::Yield(item),
                            None => {
                                state.frames.pop();
                            }
                        }
                    }
                }
                continue;
            }

            let stmt = {
                let frame = state.frames.last_mut().expect("frame present");
                let stmt = frame.block[frame.index];
                frame.index += 1;
                stmt
            };

            match &stmt.kind {
                StmtKind::Expr { value } => match &value.kind {
                    ExprKind::Yield { value: yielded } => {
                        let out = match yielded {
                            Some(expr) => self.eval(expr),
                            None => Value::None,
                        };
                        if self.exception.is_some() {
                            return Step::Done;
                        }
                        return Step::Yield(out);
                    }
                    ExprKind::YieldFrom { value: inner } => {
                        let iterable = self.eval(inner);
                        if self.exception.is_some() {
                            return Step::Done;
                        }
                        let items = self.drain_iterable(iterable, value.loc);
                        if self.exception.is_some() {
                            return Step::Done;
                        }
                        state.frames.push(GenFrame {
                            block: &[],
                            index: 0,
                            looping: Some(LoopKind::YieldSeq { items, pos: 0 }),
                        });
                    }
                    _ => {
                        self.eval(value);
                    }
                },

                StmtKind::Assign { targets, value } if matches!(value.kind, ExprKind::Yield { .. }) => {
                    let out = match &value.kind {
                        ExprKind::Yield { value: Some(expr) } => self.eval(expr),
                        _ => Value::None,
                    };
                    if self.exception.is_some() {
                        return Step::Done;
                    }
                    state.pending_assign = Some(*targets);
                    return Step::Yield(out);
                }

                StmtKind::If { test, body, orelse } => {
                    let value = self.eval(test);
                    if self.exception.is_some() {
                        return Step::Done;
                    }
                    let block = if value.is_truthy() { *body } else { *orelse };
                    state.frames.push(GenFrame { block, index: 0, looping: None });
                }

                // Loops enter with the cursor at the end so the shared
                // end-of-block path runs the first test/bind.
                StmtKind::While { test, body, .. } => {
                    state.frames.push(GenFrame {
                        block: body,
                        index: body.len(),
                        looping: Some(LoopKind::While(*test)),
                    });
                }


                StmtKind::For { target, iter, body, .. } => {
                    let iterable = self.eval(iter);
                    if self.exception.is_some() {
                        return Step::Done;
                    }
                    let items = self.drain_iterable(iterable, stmt.loc);
                    if self.exception.is_some() {
                        return Step::Done;
                    }
                    state.frames.push(GenFrame {
                        block: body,
                        index: body.len(),
                        looping: Some(LoopKind::For { target: *target, items, pos: 0 }),
                    });
                }

                StmtKind::Return { .. } => {
                    state.frames.clear();
                    return Step::Done;
                }

                StmtKind::Break => {
                    while let Some(frame) = state.frames.pop() {
                        if frame.looping.is_some() {
                            break;
                        }
                    }
                }

                StmtKind::Continue => {
                    while let Some(frame) = state.frames.last() {
                        if frame.looping.is_some() {
                            break;
                        }
                        state.frames.pop();
                    }
                    if let Some(frame) = state.frames.last_mut() {
                        frame.index = frame.block.len();
                    }
                }

                // Everything else executes through the normal walker; a
                // Return from it ends the generator.
                other => {
                    let _ = other;
                    match self.exec_stmt(stmt) {
                        Flow::Return(_) => {
                            state.frames.clear();
                            return Step::Done;
                        }
                        Flow::Break => {
                            while let Some(frame) = state.frames.pop() {
                                if frame.looping.is_some() {
                                    break;
                                }
                            }
                        }
                        Flow::Continue => {
                            while let Some(frame) = state.frames.last() {
                                if frame.looping.is_some() {
                                    break;
                                }
                                state.frames.pop();
                            }
                            if let Some(frame) = state.frames.last_mut() {
                                frame.index = frame.block.len();
                            }
                        }
                        Flow::Normal => {}
                    }
                }
            }
        }
    }

    /// Collects an iterable into a vector for loop frames.
    fn drain_iterable(&mut self, value: Value<'a>, loc: crate::ast::Loc) -> Vec<Value<'a>> {
        let Some(mut iterator) = self.make_iterator(value, loc) else {
            return Vec::new();
        };
        let mut items = Vec::new();
        while let Some(item) = self.iterator_next(&mut iterator) {
            items.push(item);
            if self.exception.is_some() {
                break;
            }
        }
        items
    }
}
