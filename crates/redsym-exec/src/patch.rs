//! The built-in emission patches and the Lua helper library. Patches
//! reconcile what `redis.call` returns inside Lua with what the interpreter
//! produces: `false` sentinels become nil, pair lists become maps, unordered
//! replies get a stable order, and numeric replies are re-tagged.

use std::rc::Rc;

use redsym_core::Value;
use redsym_core::cmd::Arity;
use redsym_core::ir::{BinOp, CallKind, Conv, Expr};

use crate::plugin::EmitPatch;

/// The name of the helper package table in emitted Lua.
pub const HELPER_PKG: &str = "redsym";

pub(crate) struct Helper {
    pub name: &'static str,
    pub args: &'static str,
    pub body: &'static [&'static str],
}

pub(crate) const HELPERS: &[Helper] = &[
    Helper {
        name: "asintstr",
        args: "val",
        body: &["return math.floor(val)"],
    },
    Helper {
        name: "at",
        args: "tbl, ix",
        body: &[
            "if type(ix) ~= \"number\" then",
            "  return tbl[ix]",
            "end",
            "if ix < 0 then",
            "  ix = #tbl + ix",
            "end",
            "return tbl[ix + 1]",
        ],
    },
    Helper {
        name: "cmp",
        args: "op, a, b",
        body: &[
            "if type(a) == \"number\" and type(b) == \"string\" then",
            "  b = tonumber(b)",
            "elseif type(a) == \"string\" and type(b) == \"number\" then",
            "  a = tonumber(a)",
            "end",
            "if op == \"lt\" then",
            "  return a < b",
            "end",
            "if op == \"le\" then",
            "  return a <= b",
            "end",
            "if op == \"gt\" then",
            "  return a > b",
            "end",
            "return a >= b",
        ],
    },
    Helper {
        name: "denull",
        args: "val",
        body: &[
            "if val == cjson.null then",
            "  return nil",
            "end",
            "if type(val) == \"table\" then",
            "  for k, v in pairs(val) do",
            "    val[k] = redsym.denull(v)",
            "  end",
            "end",
            "return val",
        ],
    },
    Helper {
        name: "keyval_dict",
        args: "values, ...",
        body: &[
            "local res = {}",
            "local fields = {...}",
            "for ix, field in ipairs(fields) do",
            "  res[field] = values[ix] or cjson.null",
            "end",
            "return res",
        ],
    },
    Helper {
        name: "nil_or_index",
        args: "val",
        body: &[
            "if val ~= nil then",
            "  val = val - 1",
            "end",
            "return val",
        ],
    },
    Helper {
        name: "nofalse",
        args: "val",
        body: &[
            "if val == false then",
            "  return nil",
            "end",
            "return val",
        ],
    },
    Helper {
        name: "pairlist_dict",
        args: "arr",
        body: &[
            "local res = {}",
            "local field = nil",
            "for _, value in ipairs(arr) do",
            "  if field ~= nil then",
            "    res[field] = value",
            "    field = nil",
            "  else",
            "    field = value",
            "  end",
            "end",
            "return res",
        ],
    },
    Helper {
        name: "pairlist_scores",
        args: "arr",
        body: &[
            "if #arr == 0 then",
            "  return nil",
            "end",
            "local res = {}",
            "local member = nil",
            "for ix, value in ipairs(arr) do",
            "  if ix % 2 == 1 then",
            "    member = value",
            "  else",
            "    res[#res + 1] = {member, tonumber(value)}",
            "  end",
            "end",
            "return res",
        ],
    },
    Helper {
        name: "sorted",
        args: "arr",
        body: &["table.sort(arr)", "return arr"],
    },
    Helper {
        name: "truthy",
        args: "val",
        body: &[
            "if val == nil or val == false or val == 0 or val == \"\" then",
            "  return false",
            "end",
            "if val == cjson.null then",
            "  return false",
            "end",
            "return true",
        ],
    },
];

pub(crate) fn helper(name: &str) -> Option<&'static Helper> {
    HELPERS.iter().find(|h| h.name == name)
}

pub(crate) fn helper_name(name: &str) -> Option<&'static str> {
    helper(name).map(|h| h.name)
}

#[must_use]
pub(crate) fn helper_arity(name: &str) -> Option<Arity> {
    helper(name).map(|h| {
        if h.args.contains("...") {
            Arity::at_least(1)
        } else {
            Arity::exact(h.args.split(',').count())
        }
    })
}

fn raw(call: Expr) -> Expr {
    match call {
        Expr::Call {
            kind, name, args, ..
        } => Expr::Call {
            kind,
            name,
            args,
            raw: true,
        },
        other => other,
    }
}

pub(crate) fn helper_call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        kind: CallKind::Helper,
        name: name.to_string(),
        args,
        raw: true,
    }
}

fn call_args(call: &Expr) -> &[Expr] {
    match call {
        Expr::Call { args, .. } => args,
        _ => &[],
    }
}

/// Wraps commands whose missing sentinel is `false` so they yield nil. The
/// wrap must not pass through host truthiness: an empty string reply has to
/// survive, which plain `or nil` would not guarantee either way.
struct NilRepair;

impl EmitPatch for NilRepair {
    fn names(&self) -> Vec<&'static str> {
        redsym_core::cmd::nil_repair_commands().collect()
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        helper_call("nofalse", vec![raw(call)])
    }
}

/// SET: a plain call reports success as a status-or-false, canonicalized to a
/// boolean; with the GET flag the reply is a bulk-or-false, repaired to nil.
struct SetRepair;

impl EmitPatch for SetRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["set"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        let has_get = call_args(&call)[2..].iter().any(|arg| {
            arg.as_literal_str()
                .is_some_and(|flag| flag.eq_ignore_ascii_case("GET"))
        });
        if has_get {
            return helper_call("nofalse", vec![raw(call)]);
        }
        Expr::Binary {
            op: BinOp::Ne,
            left: Box::new(raw(call)),
            right: Box::new(Expr::Lit(Value::Bool(false))),
        }
    }
}

/// ZPOPMIN/ZPOPMAX: the flat member/score reply becomes a list of pairs with
/// numeric scores; an empty pop becomes nil, matching the interpreter.
struct ZPopRepair;

impl EmitPatch for ZPopRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["zpopmin", "zpopmax"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        helper_call("pairlist_scores", vec![raw(call)])
    }
}

/// HGETALL: the alternating field/value reply becomes a map.
struct HGetAllRepair;

impl EmitPatch for HGetAllRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["hgetall"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        helper_call("pairlist_dict", vec![raw(call)])
    }
}

/// HMGET: values and the requested fields are zipped into a map.
struct HMGetRepair;

impl EmitPatch for HMGetRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["hmget"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        let fields: Vec<Expr> = call_args(&call)[1..].to_vec();
        let mut args = vec![raw(call)];
        args.extend(fields);
        helper_call("keyval_dict", args)
    }
}

/// HINCRBY: the float variant is used so fractional steps work, and the
/// string reply is converted back to a number. Plain INCRBY stays integer,
/// keeping the server's strict integer parse.
struct IncrByRepair;

impl EmitPatch for IncrByRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["hincrby"]
    }

    fn patch(&self, name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        let renamed = match call {
            Expr::Call { kind, args, .. } => Expr::Call {
                kind,
                name: format!("{name}float"),
                args,
                raw: true,
            },
            other => other,
        };
        if is_expr_stmt {
            return renamed;
        }
        Expr::Convert {
            conv: Conv::ToNum,
            expr: Box::new(renamed),
        }
    }
}

/// Commands answering 0/1 where the host API answers a boolean.
struct BoolRepair;

impl EmitPatch for BoolRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["sismember", "expire", "persist"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        Expr::Binary {
            op: BinOp::Eq,
            left: Box::new(raw(call)),
            right: Box::new(Expr::Lit(Value::Int(1))),
        }
    }
}

/// Replies whose server-side order is arbitrary get the engine's sort order.
struct SortRepair;

impl EmitPatch for SortRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["smembers", "hkeys", "hvals"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        helper_call("sorted", vec![raw(call)])
    }
}

/// ZSCORE: bulk-string-or-false becomes a number or nil.
struct ZScoreRepair;

impl EmitPatch for ZScoreRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["zscore"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        Expr::Convert {
            conv: Conv::ToNum,
            expr: Box::new(helper_call("nofalse", vec![raw(call)])),
        }
    }
}

/// string.find: forced into plain-text mode with a 1-based start index, the
/// found position shifted back to 0-based, nil on a miss.
struct StringFindRepair;

impl EmitPatch for StringFindRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["string.find"]
    }

    fn patch(&self, _name: &str, call: Expr, is_expr_stmt: bool) -> Expr {
        if is_expr_stmt {
            return raw(call);
        }
        let args = call_args(&call).to_vec();
        let init = match args.get(2) {
            Some(start) => Expr::Binary {
                op: BinOp::Add,
                left: Box::new(start.clone()),
                right: Box::new(Expr::Lit(Value::Int(1))),
            },
            None => Expr::Lit(Value::Int(1)),
        };
        let find = Expr::Call {
            kind: CallKind::General,
            name: "string.find".to_string(),
            args: vec![
                args[0].clone(),
                args[1].clone(),
                init,
                Expr::Lit(Value::Bool(true)),
            ],
            raw: true,
        };
        helper_call("nil_or_index", vec![find])
    }
}

/// redis.log: the symbolic level string becomes the numeric server constant.
struct RedisLogRepair;

impl EmitPatch for RedisLogRepair {
    fn names(&self) -> Vec<&'static str> {
        vec!["redis.log"]
    }

    fn patch(&self, _name: &str, call: Expr, _is_expr_stmt: bool) -> Expr {
        let Expr::Call {
            kind, name, args, ..
        } = call
        else {
            return call;
        };
        let mut args = args;
        if let Some(level) = args.first().and_then(Expr::as_literal_str) {
            let numeric = match level {
                "DEBUG" => 0,
                "VERBOSE" => 1,
                "WARNING" => 3,
                _ => 2,
            };
            args[0] = Expr::Lit(Value::Int(numeric));
        }
        Expr::Call {
            kind,
            name,
            args,
            raw: true,
        }
    }
}

pub(crate) fn default_redis_patches() -> Vec<Rc<dyn EmitPatch>> {
    vec![
        Rc::new(NilRepair),
        Rc::new(SetRepair),
        Rc::new(ZPopRepair),
        Rc::new(HGetAllRepair),
        Rc::new(HMGetRepair),
        Rc::new(IncrByRepair),
        Rc::new(BoolRepair),
        Rc::new(SortRepair),
        Rc::new(ZScoreRepair),
    ]
}

pub(crate) fn default_general_patches() -> Vec<Rc<dyn EmitPatch>> {
    vec![Rc::new(StringFindRepair), Rc::new(RedisLogRepair)]
}
