// Built-in function surface: print/show/read/sin/cos/log/sqrt/assert/go,
// `MKVsource` and the filter stubs, plus the `checkArgs`/`getOptArg`
// argument-validation helpers every built-in calls through.
//
// Each built-in is a plain `fn(Option<&Node>) -> EvalResult<Node>`
// (`CoreFnPtr`, ast.rs) with no captured environment, registered into
// the root `Environment` once at startup by `install`. Filter stubs
// perform no real frame processing -- that's owned by the plugins the
// evaluator never links against -- they only validate argument tags
// and wire `ClipHandle.input` so the graph shape is preserved for
// whatever runtime eventually walks it.

use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;

use crate::ast::{ClipHandle, CoreFn, CoreFnPtr, FnData, Node, NodeKind, TypeSet, TypeTag};
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};

fn arg_list_len(args: Option<&Node>) -> usize {
    args.map_or(0, Node::len_list)
}

fn nth_arg(args: Option<&Node>, i: usize) -> Option<&Node> {
    args?.iter().nth(i)
}

// Verifies a call's mandatory arguments: each position in `expected`
// must be present and carry one of the permitted tags. Excess
// arguments are only tolerated when they're optional (`OptArg` nodes)
// trailing the mandatory list -- mirrors `checkArgs`'s own excess-check
// in delbrot.c, which stops counting once it hits a `typeOptArg` node.
pub fn check_args(func_name: &str, args: Option<&Node>, expected: &[TypeSet]) -> EvalResult<()> {
    let mut cursor = args;
    for (i, allowed) in expected.iter().enumerate() {
        let node = cursor.ok_or_else(|| {
            EvalError::arity_mismatch(func_name, expected.len(), i, false)
        })?;
        let tag = node.type_tag().ok_or_else(|| {
            EvalError::type_mismatch(format!(
                "arg {} of {} expected {}, got {}",
                i + 1,
                func_name,
                tag_set_name(*allowed),
                node.type_name()
            ))
        })?;
        if !allowed.contains(tag) {
            return Err(EvalError::type_mismatch(format!(
                "arg {} of {} expected {}, got {}",
                i + 1,
                func_name,
                tag_set_name(*allowed),
                tag.name()
            )));
        }
        cursor = node.next.as_deref();
    }

    if let Some(extra) = cursor {
        if !matches!(&extra.kind, NodeKind::OptArg { .. }) {
            let mut total = expected.len();
            let mut rest = Some(extra);
            while let Some(node) = rest {
                if matches!(&node.kind, NodeKind::OptArg { .. }) {
                    break;
                }
                total += 1;
                rest = node.next.as_deref();
            }
            return Err(EvalError::arity_mismatch(func_name, expected.len(), total, false));
        }
    }
    Ok(())
}

fn tag_set_name(set: TypeSet) -> String {
    set.iter().map(TypeTag::name).collect::<Vec<_>>().join(" or ")
}

// Scans the optional-argument tail for `name`, checking the carried
// value against `expected`.
pub fn get_opt_arg(args: Option<&Node>, name: &str, expected: TypeTag) -> EvalResult<Option<Node>> {
    let mut cursor = args;
    while let Some(node) = cursor {
        if let NodeKind::OptArg { name: opt_name, value } = &node.kind {
            if opt_name.as_ref() == name {
                let tag = value.type_tag().ok_or_else(|| {
                    EvalError::type_mismatch(format!(
                        "optional argument \"{}\" expected {}, got {}",
                        name,
                        expected.name(),
                        value.type_name()
                    ))
                })?;
                if tag != expected {
                    return Err(EvalError::type_mismatch(format!(
                        "optional argument \"{}\" expected {}, got {}",
                        name,
                        expected.name(),
                        tag.name()
                    )));
                }
                return Ok(Some((**value).clone()));
            }
        }
        cursor = node.next.as_deref();
    }
    Ok(None)
}

fn set(tag: TypeTag) -> TypeSet {
    TypeSet::from_flag(tag)
}

fn num_arg(node: &Node) -> f64 {
    match &node.kind {
        NodeKind::Num(n) => *n,
        _ => unreachable!("checkArgs already enforced the tag"),
    }
}

fn str_arg(node: &Node) -> &str {
    match &node.kind {
        NodeKind::Str(s) => s,
        _ => unreachable!("checkArgs already enforced the tag"),
    }
}

fn bool_arg(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Bool(b) => *b,
        _ => unreachable!("checkArgs already enforced the tag"),
    }
}

// ---- general-purpose builtins ------------------------------------------------

// %.10g rendering for Num: ten significant digits, trailing zeros and
// a bare trailing '.' stripped, falling back to scientific notation
// outside [1e-4, 1e10) the way printf's `%g` does. `print`/`show` both
// go through this so `show(read(s))` round-trips for any canonical
// `%.10g` decimal `s`.
const G_PRECISION: usize = 10;

fn trim_trailing_zeros(s: &str) -> &str {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.')
}

fn format_g(x: f64) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let neg = x.is_sign_negative();
    let ax = x.abs();
    // Round through scientific notation once, then read the exponent
    // back off the already-rounded mantissa so a carry (9.9999... ->
    // 10) can't leave the exponent off by one.
    let sci = format!("{:.*e}", G_PRECISION - 1, ax);
    let epos = sci.find('e').expect("Rust's {:e} always emits 'e'");
    let mantissa = &sci[..epos];
    let exp: i32 = sci[epos + 1..].parse().expect("exponent is always an integer");

    let body = if exp < -4 || exp >= G_PRECISION as i32 {
        let mantissa = trim_trailing_zeros(mantissa);
        format!("{}e{}{}", mantissa, if exp >= 0 { "+" } else { "-" }, exp.abs())
    } else {
        let frac_digits = (G_PRECISION as i32 - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", frac_digits, ax);
        trim_trailing_zeros(&fixed).to_string()
    };

    if neg {
        format!("-{}", body)
    } else {
        body
    }
}

fn print(args: Option<&Node>) -> EvalResult<Node> {
    let mut rendered = String::new();
    let mut cursor = args;
    while let Some(node) = cursor {
        match &node.kind {
            NodeKind::Num(n) => rendered.push_str(&format!("{} ", format_g(*n))),
            NodeKind::Bool(b) => rendered.push_str(if *b { "True " } else { "False " }),
            NodeKind::Str(s) => rendered.push_str(&format!("{} ", s)),
            _ => rendered.push_str(&format!("[could not print type {}] ", node.type_name())),
        }
        cursor = node.next.as_deref();
    }
    println!("{}", rendered);
    Ok(Node::fn_sentinel())
}

fn show(args: Option<&Node>) -> EvalResult<Node> {
    let len = arg_list_len(args);
    if len != 1 {
        return Err(EvalError::arity_mismatch("show", 1, len, false));
    }
    let node = nth_arg(args, 0).expect("length already checked");
    let rendered = match &node.kind {
        NodeKind::Num(n) => format_g(*n),
        NodeKind::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        NodeKind::Str(s) => s.to_string(),
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "show is not defined for type {}",
                node.type_name()
            )))
        }
    };
    Ok(Node::bare(NodeKind::Str(rendered.into())))
}

fn read(args: Option<&Node>) -> EvalResult<Node> {
    check_args("read", args, &[set(TypeTag::Str)])?;
    let raw = str_arg(nth_arg(args, 0).unwrap());
    let value: f64 = raw.trim().parse().unwrap_or(f64::NAN);
    Ok(Node::num(value))
}

macro_rules! math_fn {
    ($name:ident, $builtin:literal, $op:expr) => {
        fn $name(args: Option<&Node>) -> EvalResult<Node> {
            check_args($builtin, args, &[set(TypeTag::Num)])?;
            let x = num_arg(nth_arg(args, 0).unwrap());
            Ok(Node::num($op(x)))
        }
    };
}

math_fn!(sin, "sin", f64::sin);
math_fn!(cos, "cos", f64::cos);
math_fn!(log, "log", f64::ln);
math_fn!(sqrt, "sqrt", f64::sqrt);

fn assert(args: Option<&Node>) -> EvalResult<Node> {
    check_args("assert", args, &[set(TypeTag::Bool), set(TypeTag::Str)])?;
    let cond = bool_arg(nth_arg(args, 0).unwrap());
    if !cond {
        let message = str_arg(nth_arg(args, 1).unwrap()).to_string();
        return Err(EvalError::assertion_failed(message));
    }
    Ok(Node::fn_sentinel())
}

fn go(args: Option<&Node>) -> EvalResult<Node> {
    check_args("go", args, &[])?;
    println!("Initiating Multithreaded Filters");
    println!("All filters are running");
    println!("All filters have completed");
    Ok(Node::fn_sentinel())
}

// ---- clip / filter stubs ------------------------------------------------------

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

fn new_clip(input: Option<Node>) -> Node {
    let id = NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed);
    Node::bare(NodeKind::Clip(ClipHandle { id, input: input.map(Box::new) }))
}

fn clip_arg(node: &Node) -> Node {
    match &node.kind {
        NodeKind::Clip(_) => node.clone(),
        _ => unreachable!("checkArgs already enforced the tag"),
    }
}

fn mkv_source(args: Option<&Node>) -> EvalResult<Node> {
    check_args("MKVsource", args, &[set(TypeTag::Str)])?;
    Ok(new_clip(None))
}

fn ffmpeg_decode(args: Option<&Node>) -> EvalResult<Node> {
    check_args("ffmpegDecode", args, &[set(TypeTag::Str)])?;
    Ok(new_clip(None))
}

fn gradient_video_generate(args: Option<&Node>) -> EvalResult<Node> {
    check_args("gradientVideoGenerate", args, &[])?;
    Ok(new_clip(None))
}

fn testing_gradient(args: Option<&Node>) -> EvalResult<Node> {
    check_args("testingGradient", args, &[])?;
    Ok(new_clip(None))
}

// A filter that takes a clip (piped in via the method-chain lowering)
// and any number of optional tuning arguments, ignored here since
// their semantics belong to the plugin, not the evaluator.
fn chained_filter(name: &str, args: Option<&Node>) -> EvalResult<Node> {
    check_args(name, args, &[set(TypeTag::Clip)])?;
    let input = clip_arg(nth_arg(args, 0).unwrap());
    Ok(new_clip(Some(input)))
}

fn bilinear_resize(args: Option<&Node>) -> EvalResult<Node> {
    chained_filter("bilinearResize", args)
}

fn crop(args: Option<&Node>) -> EvalResult<Node> {
    chained_filter("crop", args)
}

fn remove_range(args: Option<&Node>) -> EvalResult<Node> {
    chained_filter("removeRange", args)
}

fn write_raw_file(args: Option<&Node>) -> EvalResult<Node> {
    check_args("writeRawFile", args, &[set(TypeTag::Clip), set(TypeTag::Str)])?;
    let input = clip_arg(nth_arg(args, 0).unwrap());
    Ok(new_clip(Some(input)))
}

fn x264_encode(args: Option<&Node>) -> EvalResult<Node> {
    check_args("x264Encode", args, &[set(TypeTag::Clip), set(TypeTag::Str)])?;
    let input = clip_arg(nth_arg(args, 0).unwrap());
    Ok(new_clip(Some(input)))
}

// ---- registration ---------------------------------------------------------------

lazy_static! {
    static ref TABLE: Vec<(&'static str, CoreFnPtr)> = vec![
        ("print", print as CoreFnPtr),
        ("show", show as CoreFnPtr),
        ("read", read as CoreFnPtr),
        ("sin", sin as CoreFnPtr),
        ("cos", cos as CoreFnPtr),
        ("log", log as CoreFnPtr),
        ("sqrt", sqrt as CoreFnPtr),
        ("assert", assert as CoreFnPtr),
        ("go", go as CoreFnPtr),
        ("MKVsource", mkv_source as CoreFnPtr),
        ("ffmpegDecode", ffmpeg_decode as CoreFnPtr),
        ("gradientVideoGenerate", gradient_video_generate as CoreFnPtr),
        ("testingGradient", testing_gradient as CoreFnPtr),
        ("bilinearResize", bilinear_resize as CoreFnPtr),
        ("crop", crop as CoreFnPtr),
        ("removeRange", remove_range as CoreFnPtr),
        ("writeRawFile", write_raw_file as CoreFnPtr),
        ("x264Encode", x264_encode as CoreFnPtr),
    ];
}

/// Populates the root environment's function table with the built-in
/// registry (a static table of (name, function_pointer) pairs).
pub fn install(env: &Environment) {
    for (name, ptr) in TABLE.iter() {
        env.put_fn(std::rc::Rc::new(FnData::Core(CoreFn { name, ptr: *ptr })));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    fn list(nodes: Vec<Node>) -> Option<Node> {
        let mut iter = nodes.into_iter().rev();
        let mut head: Option<Node> = None;
        for mut node in iter.by_ref() {
            node.next = head.take().map(Box::new);
            head = Some(node);
        }
        head
    }

    #[test]
    fn check_args_accepts_matching_tags() {
        let args = list(vec![Node::num(3.0), Node::boolean(true)]);
        check_args("f", args.as_ref(), &[set(TypeTag::Num), set(TypeTag::Bool)]).unwrap();
    }

    #[test]
    fn check_args_rejects_missing_argument() {
        let args = list(vec![Node::num(3.0)]);
        let err = check_args("f", args.as_ref(), &[set(TypeTag::Num), set(TypeTag::Bool)]).unwrap_err();
        assert!(err.message().contains("expected 2 arguments, got 1"));
    }

    #[test]
    fn check_args_rejects_wrong_tag() {
        let args = list(vec![Node::boolean(true)]);
        let err = check_args("f", args.as_ref(), &[set(TypeTag::Num)]).unwrap_err();
        assert!(err.message().contains("arg 1 of f expected number, got boolean"));
    }

    #[test]
    fn get_opt_arg_finds_named_entry() {
        let args = list(vec![Node::opt_arg("left", Node::num(8.0))]);
        let found = get_opt_arg(args.as_ref(), "left", TypeTag::Num).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn get_opt_arg_absent_is_none() {
        let args = list(vec![Node::opt_arg("left", Node::num(8.0))]);
        let found = get_opt_arg(args.as_ref(), "top", TypeTag::Num).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn sqrt_computes_root() {
        let args = list(vec![Node::num(9.0)]);
        let result = sqrt(args.as_ref()).unwrap();
        match result.kind {
            NodeKind::Num(n) => assert!((n - 3.0).abs() < 1e-9),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn assert_failure_carries_message() {
        let args = list(vec![Node::boolean(false), Node::bare(NodeKind::Str("boom".into()))]);
        let err = assert(args.as_ref()).unwrap_err();
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn format_g_drops_trailing_zeros() {
        assert_eq!(format_g(7.0), "7");
        assert_eq!(format_g(42.0), "42");
        assert_eq!(format_g(3.5), "3.5");
        assert_eq!(format_g(-2.25), "-2.25");
        assert_eq!(format_g(0.0), "0");
    }

    #[test]
    fn format_g_uses_scientific_outside_range() {
        assert_eq!(format_g(1e20), "1e+20");
        assert_eq!(format_g(1.5e-6), "1.5e-6");
    }

    #[test]
    fn show_read_round_trips_canonical_decimal() {
        let shown = show(list(vec![Node::num(42.0)]).as_ref()).unwrap();
        let text = match &shown.kind {
            NodeKind::Str(s) => s.to_string(),
            _ => panic!("expected string"),
        };
        assert_eq!(text, "42");
        let read_back = read(list(vec![Node::bare(NodeKind::Str(text.into()))]).as_ref()).unwrap();
        match read_back.kind {
            NodeKind::Num(n) => assert_eq!(n, 42.0),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn crop_wires_clip_input() {
        let clip = new_clip(None);
        let args = list(vec![clip.clone()]);
        let out = crop(args.as_ref()).unwrap();
        match out.kind {
            NodeKind::Clip(handle) => assert!(handle.input.is_some()),
            _ => panic!("expected clip"),
        }
    }
}
