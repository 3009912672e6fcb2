//! Rewrite passes over a token stream. Each pass returns how many edits it
//! made.

use super::gpu::GpuProfile;
use super::tokenizer::{next_significant, Token, TokenKind};
use super::ShaderStage;
use crate::profile::PrecisionMode;

/// A `precision <qualifier> <type>;` statement.
#[derive(Debug, Clone, Copy)]
struct PrecisionStatement {
    qualifier: usize,
    ty: usize,
    end: usize,
}

fn precision_statements(tokens: &[Token]) -> Vec<PrecisionStatement> {
    let mut found = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_ident("precision") {
            continue;
        }
        let Some(qualifier) = next_significant(tokens, i + 1) else { continue };
        if PrecisionMode::from_glsl(&tokens[qualifier].text).is_none() {
            continue;
        }
        let Some(ty) = next_significant(tokens, qualifier + 1) else { continue };
        if tokens[ty].kind != TokenKind::Identifier {
            continue;
        }
        let Some(end) = next_significant(tokens, ty + 1) else { continue };
        if tokens[end].is_punct(";") {
            found.push(PrecisionStatement { qualifier, ty, end });
        }
    }
    found
}

/// Index of the last `#version`/`#extension`/`#pragma` directive in the
/// leading header block, skipping comments and whitespace.
fn header_end(tokens: &[Token]) -> Option<usize> {
    let mut last = None;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_trivia() {
            continue;
        }
        if token.kind == TokenKind::Directive && is_header_directive(&token.text) {
            last = Some(i);
            continue;
        }
        break;
    }
    last
}

fn directive_name(text: &str) -> &str {
    let body = text.trim_start().trim_start_matches('#').trim_start();
    body.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or("")
}

fn is_header_directive(text: &str) -> bool {
    matches!(directive_name(text), "version" | "extension" | "pragma")
}

fn has_default_float_precision(tokens: &[Token]) -> bool {
    precision_statements(tokens)
        .iter()
        .any(|s| tokens[s.ty].text == "float")
}

/// Inserts `block` after the header, or at the start when there is none.
fn insert_after_header(tokens: &mut Vec<Token>, block: &str) {
    match header_end(tokens) {
        Some(h) => tokens.insert(h + 1, Token::injected(format!("\n{}", block))),
        None => tokens.insert(0, Token::injected(format!("{}\n", block))),
    }
}

/// Inserts `block` after the last precision statement, falling back to
/// the header position.
fn insert_after_declarations(tokens: &mut Vec<Token>, block: &str) {
    match precision_statements(tokens).last() {
        Some(statement) => {
            let at = statement.end + 1;
            tokens.insert(at, Token::injected(format!("\n{}", block)));
        }
        None => insert_after_header(tokens, block),
    }
}

/// Rewrites `precision` statements for `float` and `int` to `target`.
pub fn normalize_precision(tokens: &mut [Token], target: PrecisionMode) -> usize {
    let mut edits = 0;
    for statement in precision_statements(tokens) {
        if !matches!(tokens[statement.ty].text.as_str(), "float" | "int") {
            continue;
        }
        let qualifier = &mut tokens[statement.qualifier];
        if qualifier.text != target.as_glsl() {
            qualifier.text = target.as_glsl().to_string();
            edits += 1;
        }
    }
    edits
}

/// Lowers every precision qualifier above `target` to `target`.
pub fn downgrade_qualifiers(tokens: &mut [Token], target: PrecisionMode) -> usize {
    if target == PrecisionMode::Highp {
        return 0;
    }
    let mut edits = 0;
    for token in tokens.iter_mut() {
        if token.kind != TokenKind::Identifier {
            continue;
        }
        if let Some(mode) = PrecisionMode::from_glsl(&token.text) {
            if mode > target {
                token.text = target.as_glsl().to_string();
                edits += 1;
            }
        }
    }
    edits
}

/// Adds `precision <target> float;` to a fragment shader that declares no
/// default float precision.
pub fn insert_default_precision(
    tokens: &mut Vec<Token>,
    stage: ShaderStage,
    target: PrecisionMode,
) -> usize {
    if stage != ShaderStage::Fragment || has_default_float_precision(tokens) {
        return 0;
    }
    insert_after_header(tokens, &format!("precision {} float;", target.as_glsl()));
    1
}

const MEDIUMP_HELPERS: &str = "\
float ks_emulate(float v) { float e = exp2(floor(log2(max(abs(v), 6.103515625e-05)))); return clamp(floor(v / e * 1024.0 + 0.5) * e / 1024.0, -65504.0, 65504.0); }
vec2 ks_emulate(vec2 v) { return vec2(ks_emulate(v.x), ks_emulate(v.y)); }
vec3 ks_emulate(vec3 v) { return vec3(ks_emulate(v.x), ks_emulate(v.y), ks_emulate(v.z)); }
vec4 ks_emulate(vec4 v) { return vec4(ks_emulate(v.x), ks_emulate(v.y), ks_emulate(v.z), ks_emulate(v.w)); }";

const LOWP_HELPERS: &str = "\
float ks_emulate(float v) { return clamp(floor(v * 256.0 + 0.5) / 256.0, -2.0, 2.0); }
vec2 ks_emulate(vec2 v) { return vec2(ks_emulate(v.x), ks_emulate(v.y)); }
vec3 ks_emulate(vec3 v) { return vec3(ks_emulate(v.x), ks_emulate(v.y), ks_emulate(v.z)); }
vec4 ks_emulate(vec4 v) { return vec4(ks_emulate(v.x), ks_emulate(v.y), ks_emulate(v.z), ks_emulate(v.w)); }";

/// Emits `ks_emulate` overloads quantizing to `target`. Nothing for highp.
pub fn emit_emulation_helpers(tokens: &mut Vec<Token>, target: PrecisionMode) -> usize {
    let helpers = match target {
        PrecisionMode::Highp => return 0,
        PrecisionMode::Mediump => MEDIUMP_HELPERS,
        PrecisionMode::Lowp => LOWP_HELPERS,
    };
    insert_after_declarations(tokens, helpers);
    1
}

/// Comments out `#extension` directives the GPU does not support. The
/// directive stays on its own lines so line numbers in driver errors match.
pub fn filter_extensions(tokens: &mut [Token], gpu: &GpuProfile<'_>) -> usize {
    let mut edits = 0;
    for token in tokens.iter_mut() {
        if token.kind != TokenKind::Directive || directive_name(&token.text) != "extension" {
            continue;
        }
        let name = extension_name(&token.text);
        if name.is_empty() || gpu.supports_extension(name) {
            continue;
        }
        let (kind, text) = if token.text.contains('\n') {
            (
                TokenKind::BlockComment,
                format!("/* {} */", token.text.replace("*/", "* /")),
            )
        } else {
            (TokenKind::LineComment, format!("// {}", token.text))
        };
        token.kind = kind;
        token.text = text;
        edits += 1;
    }
    edits
}

fn extension_name(directive: &str) -> &str {
    let body = directive.trim_start().trim_start_matches('#').trim_start();
    let rest = body.strip_prefix("extension").unwrap_or("");
    rest.split(':').next().unwrap_or("").trim()
}

/// Body braces of `main`: (index of `{`, index of matching `}`).
fn main_body(tokens: &[Token]) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token.is_punct("{") {
            depth += 1;
        } else if token.is_punct("}") {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_ident("main") {
            let open_paren = next_significant(tokens, i + 1).filter(|&p| tokens[p].is_punct("("))?;
            let close_paren = (open_paren..tokens.len()).find(|&p| tokens[p].is_punct(")"))?;
            let Some(open) = next_significant(tokens, close_paren + 1) else {
                return None;
            };
            if !tokens[open].is_punct("{") {
                // prototype only
                i = open;
                continue;
            }
            let mut inner = 0usize;
            for (j, t) in tokens.iter().enumerate().skip(open) {
                if t.is_punct("{") {
                    inner += 1;
                } else if t.is_punct("}") {
                    inner -= 1;
                    if inner == 0 {
                        return Some((open, j));
                    }
                }
            }
            return None;
        }
        i += 1;
    }
    None
}

/// Name of the first global `out vec4` declaration.
fn fragment_output(tokens: &[Token]) -> Option<String> {
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_ident("out") {
            continue;
        }
        let mut j = next_significant(tokens, i + 1)?;
        if PrecisionMode::from_glsl(&tokens[j].text).is_some() {
            j = next_significant(tokens, j + 1)?;
        }
        if !tokens[j].is_ident("vec4") {
            continue;
        }
        let name = next_significant(tokens, j + 1)?;
        if tokens[name].kind == TokenKind::Identifier {
            return Some(tokens[name].text.clone());
        }
    }
    None
}

fn is_es3(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| {
        t.kind == TokenKind::Directive
            && directive_name(&t.text) == "version"
            && t.text.contains("300")
    })
}

fn noise_constants(seed: u64) -> [f64; 3] {
    let lane = |shift: u32| ((seed >> shift) & 0xffff) as f64 / 65536.0;
    [
        127.1 + lane(0) * 100.0,
        311.7 + lane(16) * 100.0,
        19.19 + lane(32) * 10.0,
    ]
}

/// Adds the seeded `ks_noise` function to a fragment shader and blends it
/// into the color output at the end of `main`.
pub fn inject_noise(
    tokens: &mut Vec<Token>,
    stage: ShaderStage,
    seed: u64,
    amplitude: f32,
) -> usize {
    if stage != ShaderStage::Fragment {
        return 0;
    }
    let target = match fragment_output(tokens) {
        Some(name) => name,
        None if is_es3(tokens) => return 0,
        None => "gl_FragColor".to_string(),
    };
    let [a, b, c] = noise_constants(seed);
    let functions = format!(
        "float ks_hash(vec2 p) {{ p = fract(p * vec2({a:.6}, {b:.6})); p += dot(p, p + {c:.6}); return fract(p.x * p.y); }}\n\
         float ks_noise(vec2 p) {{ return (ks_hash(p) - 0.5) * {amplitude:.8}; }}"
    );
    insert_after_declarations(tokens, &functions);

    let Some((_, close)) = main_body(tokens) else {
        return 1;
    };
    tokens.insert(
        close,
        Token::injected(format!(
            "  {target} = clamp({target} + vec4(vec3(ks_noise(gl_FragCoord.xy)), 0.0), 0.0, 1.0);\n"
        )),
    );
    2
}

/// Adds a comment naming the profile the shader was translated for.
pub fn insert_banner(tokens: &mut Vec<Token>, stage: ShaderStage, gpu: &GpuProfile<'_>) -> usize {
    let banner = format!(
        "// ki-spoof: {} shader for {} / {} ({})",
        stage,
        gpu.vendor,
        gpu.architecture,
        gpu.precision_for(stage)
    );
    insert_after_header(tokens, &banner);
    1
}
