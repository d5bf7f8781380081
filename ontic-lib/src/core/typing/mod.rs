/*!

The bidirectional type checker.

`check` weak-head normalizes the expected type, dispatches on the term through `infer`, and
compares the inferred type against the expectation with the equality engine. Checking carries an
`erased` flag marking computationally irrelevant positions; using a proof-erased variable in a
relevant position is an error.

References are checked once: a successful check substitutes any resolved holes into the
recovered type and body, caches the type, and rewrites the stored definition into an ascription
whose `done` flag is set. While an ascribed definition's own body is being checked, its declared
type is provisionally trusted so that recursion through the reference terminates; the
provisional entry is rolled back if the check fails.

*/

pub mod context;
pub mod holes;

use ontic_abs::IString;

use crate::{
  api::{
    error::{TypeError, TypeErrorKind},
    term::{Term, TermKind},
  },
  core::{
    erasure::is_erased_marker,
    session::{Diagnostic, Session},
    substitution::{shift, subst},
    typing::{context::Context, holes::HoleValue},
  },
};

/// Checks the named top-level definition under an optional expected type, then reports holes
/// through the session's diagnostic sink.
pub fn typecheck(
  session: &mut Session,
  name: &IString,
  expected: Option<Term>,
) -> Result<Term, TypeError> {
  let def = match session.defs.get(name) {
    Some(def) => def.clone(),
    None => {
      return Err(TypeError::new(
        TypeErrorKind::UnknownReference { name: name.clone() },
        &Term::reference(name.clone(), false),
        &Context::new(),
      ));
    }
  };

  let provisional = trust_ascription(session, name, &def);
  let outcome = check(session, &def, expected.as_ref(), &Context::new(), false);

  match outcome {
    Ok(ty) => {
      let ty = memoize_reference(session, name, &def, ty);
      report_holes(session);
      Ok(ty)
    }
    Err(error) => {
      if provisional {
        session.types.remove(name);
      }
      Err(error)
    }
  }
}

/// Infers or checks a term. When an expected type is given it is weak-head normalized before
/// use, and the inferred type must equal it.
pub fn check(
  session: &mut Session,
  term: &Term,
  expected: Option<&Term>,
  ctx: &Context,
  erased: bool,
) -> Result<Term, TypeError> {
  let expected = expected.map(|e| session.reduce_at(e, ctx.len()));
  let inferred = infer(session, term, expected.as_ref(), ctx, erased)?;

  if let Some(expected) = &expected {
    if !session.equal(&inferred, expected, ctx.len()) {
      let expected = session.normalize_at(expected, ctx.len());
      let actual = session.normalize_at(&inferred, ctx.len());
      return Err(TypeError::new(
        TypeErrorKind::Mismatch { expected, actual },
        term,
        ctx,
      ));
    }
  }

  Ok(inferred)
}

fn infer(
  session: &mut Session,
  term: &Term,
  expected: Option<&Term>,
  ctx: &Context,
  erased: bool,
) -> Result<Term, TypeError> {
  match term.kind() {
    TermKind::Var { index } => {
      let frame = match ctx.get(*index) {
        Some(frame) => frame,
        None => {
          return Err(TypeError::new(
            TypeErrorKind::UnboundVariable { index: *index },
            term,
            ctx,
          ));
        }
      };
      if frame.erased && !erased {
        return Err(TypeError::new(
          TypeErrorKind::ErasedUse { name: frame.name },
          term,
          ctx,
        ));
      }
      Ok(frame.ty)
    }

    // Type-in-type: there is no universe hierarchy.
    TermKind::Typ => Ok(Term::typ()),
    TermKind::Num => Ok(Term::typ()),
    TermKind::Val { .. } => Ok(Term::num()),

    TermKind::All { name, bind, body, erased: all_erased } => {
      if let Some(expected) = expected {
        if !expected.is_typ() {
          return Err(TypeError::new(
            TypeErrorKind::NonTypeInForall { expected: expected.clone() },
            term,
            ctx,
          ));
        }
      }
      check(session, bind, Some(&Term::typ()), ctx, true)?;
      let body_ctx = ctx.extended(name.clone(), None, (**bind).clone(), *all_erased);
      check(session, body, Some(&Term::typ()), &body_ctx, true)?;
      Ok(Term::typ())
    }

    TermKind::Lam { name, bind, body, erased: lam_erased } => {
      let (domain, codomain) = match expected.map(|e| e.kind()) {
        Some(TermKind::All {
          bind: dom, body: cod, erased: all_erased, ..
        }) => {
          if all_erased != lam_erased {
            return Err(TypeError::new(TypeErrorKind::ErasureMismatch, term, ctx));
          }
          if let Some(annotation) = bind {
            check(session, annotation, Some(&Term::typ()), ctx, true)?;
            if !session.equal(annotation, dom, ctx.len()) {
              let expected = session.normalize_at(dom, ctx.len());
              let actual = session.normalize_at(annotation, ctx.len());
              return Err(TypeError::new(
                TypeErrorKind::Mismatch { expected, actual },
                term,
                ctx,
              ));
            }
          }
          ((**dom).clone(), Some((**cod).clone()))
        }
        _ => match bind {
          Some(annotation) => {
            check(session, annotation, Some(&Term::typ()), ctx, true)?;
            ((**annotation).clone(), None)
          }
          None => {
            return Err(TypeError::new(TypeErrorKind::UntypedLambda, term, ctx));
          }
        },
      };

      let body_ctx = ctx.extended(name.clone(), None, domain.clone(), *lam_erased);
      let body_ty = check(session, body, codomain.as_ref(), &body_ctx, erased)?;
      Ok(Term::all(name.clone(), domain, body_ty, *lam_erased))
    }

    TermKind::App { func, argm, erased: app_erased } => {
      let func_ty = infer(session, func, None, ctx, erased)?;
      let func_ty = session.reduce_at(&func_ty, ctx.len());
      match func_ty.kind() {
        TermKind::All { bind, body, erased: all_erased, .. } => {
          if all_erased != app_erased {
            return Err(TypeError::new(TypeErrorKind::ErasureMismatch, term, ctx));
          }
          check(session, argm, Some(bind.as_ref()), ctx, erased || *app_erased)?;
          // The codomain sees the argument ascribed at the domain, memoized as checked.
          let ascribed = Term::ann((**bind).clone(), (**argm).clone(), true);
          Ok(subst(body, &ascribed, 0))
        }
        _ => Err(TypeError::new(
          TypeErrorKind::NonFunction { ty: func_ty.clone() },
          term,
          ctx,
        )),
      }
    }

    TermKind::Op1 { num0, .. } => {
      check(session, num0, Some(&Term::num()), ctx, erased)?;
      Ok(Term::num())
    }

    TermKind::Op2 { num0, num1, .. } => {
      check(session, num0, Some(&Term::num()), ctx, erased)?;
      check(session, num1, Some(&Term::num()), ctx, erased)?;
      Ok(Term::num())
    }

    TermKind::Ite { cond, if_true, if_false } => {
      let cond_ty = infer(session, cond, None, ctx, erased)?;
      let cond_ty = session.reduce_at(&cond_ty, ctx.len());
      if !cond_ty.is_num() {
        return Err(TypeError::new(
          TypeErrorKind::IfCondNotNumeric { ty: cond_ty },
          term,
          ctx,
        ));
      }
      let then_ty = check(session, if_true, expected, ctx, erased)?;
      check(session, if_false, Some(&then_ty), ctx, erased)?;
      Ok(match expected {
        Some(expected) => expected.clone(),
        None => then_ty,
      })
    }

    TermKind::Slf { name, ty } => {
      let self_ctx = ctx.extended(name.clone(), None, term.clone(), true);
      check(session, ty, Some(&Term::typ()), &self_ctx, true)?;
      Ok(Term::typ())
    }

    TermKind::New { ty, expr } => {
      let ty_whnf = session.reduce_at(ty, ctx.len());
      match ty_whnf.kind() {
        TermKind::Slf { ty: self_body, .. } => {
          // The self variable is the introduced term itself, ascribed at its self type.
          let self_term = Term::ann(ty_whnf.clone(), term.clone(), true);
          let unrolled = subst(self_body, &self_term, 0);
          check(session, expr, Some(&unrolled), ctx, erased)?;
          Ok((**ty).clone())
        }
        _ => Err(TypeError::new(
          TypeErrorKind::NewOfNonSelf { ty: ty_whnf },
          term,
          ctx,
        )),
      }
    }

    TermKind::Use { expr } => {
      let expr_ty = infer(session, expr, None, ctx, erased)?;
      let expr_ty = session.reduce_at(&expr_ty, ctx.len());
      match expr_ty.kind() {
        TermKind::Slf { ty: self_body, .. } => Ok(subst(self_body, expr, 0)),
        _ => Err(TypeError::new(
          TypeErrorKind::UseOfNonSelf { ty: expr_ty },
          term,
          ctx,
        )),
      }
    }

    TermKind::Ann { ty, expr, done } => {
      if done.get() {
        return Ok((**ty).clone());
      }
      // Set before descending so a recursive reference to this ascription short-circuits;
      // rolled back if anything below fails.
      done.set(true);
      let outcome = check(session, ty, Some(&Term::typ()), ctx, true)
          .and_then(|_| check(session, expr, Some(ty.as_ref()), ctx, erased));
      match outcome {
        Ok(_) => Ok((**ty).clone()),
        Err(error) => {
          done.set(false);
          Err(error)
        }
      }
    }

    TermKind::Log { msge, expr } => {
      let msge_ty = infer(session, msge, None, ctx, true)?;
      session.sink().emit(&Diagnostic::LogType { ty: msge_ty });
      check(session, expr, expected, ctx, erased)
    }

    TermKind::Hol { name } => {
      session
          .holes
          .register(name, expected.cloned(), ctx.clone(), ctx.len());
      match expected {
        Some(expected) => Ok(expected.clone()),
        None => Ok(Term::hol(format!("{}_type", name))),
      }
    }

    TermKind::Ref { name, .. } => {
      if let Some(cached) = session.types.get(name) {
        return Ok(cached.clone());
      }
      let def = match session.defs.get(name) {
        Some(def) => def.clone(),
        None => {
          return Err(TypeError::new(
            TypeErrorKind::UnknownReference { name: name.clone() },
            term,
            ctx,
          ));
        }
      };

      let provisional = trust_ascription(session, name, &def);
      // Referenced definitions are closed: they check in the empty context.
      let outcome = infer(session, &def, None, &Context::new(), false);
      match outcome {
        Ok(ty) => Ok(memoize_reference(session, name, &def, ty)),
        Err(error) => {
          if provisional {
            session.types.remove(name);
          }
          Err(error)
        }
      }
    }
  }
}

/// Provisionally caches an ascribed definition's declared type so that recursion through the
/// reference terminates while its body is checked. Returns whether an entry was added.
fn trust_ascription(session: &mut Session, name: &IString, def: &Term) -> bool {
  if session.types.contains_key(name) {
    return false;
  }
  if let TermKind::Ann { ty, .. } = def.kind() {
    session.types.insert(name.clone(), (**ty).clone());
    true
  } else {
    false
  }
}

/// Substitutes resolved holes into the recovered type and body, caches the type, and rewrites
/// the stored definition into a checked ascription.
fn memoize_reference(session: &mut Session, name: &IString, def: &Term, ty: Term) -> Term {
  let resolved_ty = resolve_holes(session, &ty);
  let resolved_def = resolve_holes(session, def);
  let body = match resolved_def.kind() {
    TermKind::Ann { expr, .. } => (**expr).clone(),
    _ => resolved_def,
  };
  session.types.insert(name.clone(), resolved_ty.clone());
  session
      .defs
      .insert(name.clone(), Term::ann(resolved_ty.clone(), body, true));
  resolved_ty
}

/// Replaces every solved hole by its value, shifted from the hole's recorded depth to the
/// occurrence's depth.
pub fn resolve_holes(session: &Session, term: &Term) -> Term {
  resolve_at(session, term, 0)
}

fn resolve_at(session: &Session, term: &Term, depth: usize) -> Term {
  let kind = match term.kind() {
    TermKind::Hol { name } => {
      return match session.holes.solution(name) {
        Some((value, hole_depth)) => {
          let shifted = shift(&value, depth as i64 - hole_depth as i64, 0);
          resolve_at(session, &shifted, depth)
        }
        None => term.clone(),
      };
    }
    TermKind::Var { .. }
    | TermKind::Typ
    | TermKind::Num
    | TermKind::Val { .. }
    | TermKind::Ref { .. } => return term.clone(),
    TermKind::All { name, bind, body, erased } => TermKind::All {
      name:   name.clone(),
      bind:   Box::new(resolve_at(session, bind, depth)),
      body:   Box::new(resolve_at(session, body, depth + 1)),
      erased: *erased,
    },
    TermKind::Lam { name, bind, body, erased } => TermKind::Lam {
      name:   name.clone(),
      bind:   bind.as_ref().map(|b| Box::new(resolve_at(session, b, depth))),
      body:   Box::new(resolve_at(session, body, depth + 1)),
      erased: *erased,
    },
    TermKind::App { func, argm, erased } => TermKind::App {
      func:   Box::new(resolve_at(session, func, depth)),
      argm:   Box::new(resolve_at(session, argm, depth)),
      erased: *erased,
    },
    TermKind::Slf { name, ty } => TermKind::Slf {
      name: name.clone(),
      ty:   Box::new(resolve_at(session, ty, depth + 1)),
    },
    TermKind::New { ty, expr } => TermKind::New {
      ty:   Box::new(resolve_at(session, ty, depth)),
      expr: Box::new(resolve_at(session, expr, depth)),
    },
    TermKind::Use { expr } => TermKind::Use {
      expr: Box::new(resolve_at(session, expr, depth)),
    },
    TermKind::Op1 { op, num0, num1 } => TermKind::Op1 {
      op:   *op,
      num0: Box::new(resolve_at(session, num0, depth)),
      num1: *num1,
    },
    TermKind::Op2 { op, num0, num1 } => TermKind::Op2 {
      op:   *op,
      num0: Box::new(resolve_at(session, num0, depth)),
      num1: Box::new(resolve_at(session, num1, depth)),
    },
    TermKind::Ite { cond, if_true, if_false } => TermKind::Ite {
      cond:     Box::new(resolve_at(session, cond, depth)),
      if_true:  Box::new(resolve_at(session, if_true, depth)),
      if_false: Box::new(resolve_at(session, if_false, depth)),
    },
    TermKind::Ann { ty, expr, done } => TermKind::Ann {
      ty:   Box::new(resolve_at(session, ty, depth)),
      expr: Box::new(resolve_at(session, expr, depth)),
      done: done.clone(),
    },
    TermKind::Log { msge, expr } => TermKind::Log {
      msge: Box::new(resolve_at(session, msge, depth)),
      expr: Box::new(resolve_at(session, expr, depth)),
    },
  };
  Term::new(kind, term.loc().cloned())
}

/// Reports named holes through the sink: unresolved ones with their goal and context, solved
/// ones with their solution. Anonymous holes (names starting with `_`) and erasure sentinels
/// are skipped.
fn report_holes(session: &Session) {
  for (name, entry) in session.holes.iter() {
    if is_erased_marker(name) || name.as_ref().starts_with('_') {
      continue;
    }
    match &entry.value {
      HoleValue::Solved(value) => {
        session.sink().emit(&Diagnostic::SolvedHole {
          name:  name.clone(),
          value: value.clone(),
        });
      }
      HoleValue::Unset | HoleValue::Conflicted => {
        session.sink().emit(&Diagnostic::UnsolvedHole {
          name:    name.clone(),
          goal:    entry.expected.clone(),
          context: entry.context.clone(),
        });
      }
    }
  }
}
