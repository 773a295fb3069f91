use std::collections::HashMap;

/// The root abstract syntax tree (AST) for a parsed `cachegate.conf`.
#[derive(Debug, Default)]
pub struct CachegateAst {
    /// Number of worker threads for the Tokio runtime
    pub worker_threads: Option<usize>,
    /// Listen port or `host:port` for the proxy
    pub listen: Option<String>,
    /// Path for the NDJSON telemetry event log
    pub events_log: Option<String>,
    /// The `origin { ... }` block describing the generation service
    pub origin: Option<OriginBlock>,
    /// The `cache { ... }` block describing store and capture behaviour
    pub cache: Option<CacheBlock>,
}

/// Represents the `origin { ... }` block.
#[derive(Debug, Default)]
pub struct OriginBlock {
    /// Generic key-value directives (host, port, scheme, keepalive, bearer_token)
    pub directives: HashMap<String, String>,
}

/// Represents the `cache { ... }` block.
#[derive(Debug, Default)]
pub struct CacheBlock {
    /// Generic key-value directives (store, store_root, stream_threshold)
    pub directives: HashMap<String, String>,
    /// Accumulated `bypass /prefix;` directives, in file order
    pub bypass: Vec<String>,
}

/// A highly simplified parser for the nginx-flavoured Cachegate config
/// syntax. Converts raw configuration text into the `CachegateAst`.
pub fn parse_config(input: &str) -> CachegateAst {
    let mut config = CachegateAst::default();

    // First pass: lexical analysis (tokenize the string)
    let tokens = tokenize(input);
    let mut i = 0;

    // Second pass: recursive descent parsing
    while i < tokens.len() {
        let token = &tokens[i];

        // Parse: `worker_threads 8;`
        if token == "worker_threads" && i + 2 < tokens.len() && tokens[i + 2] == ";" {
            if let Ok(threads) = tokens[i + 1].parse::<usize>() {
                config.worker_threads = Some(threads);
            }
            i += 3;
            continue;
        }

        // Parse: `listen 8080;`
        if token == "listen" && i + 2 < tokens.len() && tokens[i + 2] == ";" {
            config.listen = Some(tokens[i + 1].clone());
            i += 3;
            continue;
        }

        // Parse: `events_log logs/events.log;`
        if token == "events_log" && i + 2 < tokens.len() && tokens[i + 2] == ";" {
            config.events_log = Some(tokens[i + 1].clone());
            i += 3;
            continue;
        }

        // Parse: `origin { ... }`
        if token == "origin" && i + 1 < tokens.len() && tokens[i + 1] == "{" {
            i += 2;
            let (block, new_i) = parse_origin_block(&tokens, i);
            config.origin = Some(block);
            i = new_i;
            continue;
        }

        // Parse: `cache { ... }`
        if token == "cache" && i + 1 < tokens.len() && tokens[i + 1] == "{" {
            i += 2;
            let (block, new_i) = parse_cache_block(&tokens, i);
            config.cache = Some(block);
            i = new_i;
            continue;
        }

        i += 1;
    }

    config
}

/// Parses the contents inside an `origin { ... }` block.
fn parse_origin_block(tokens: &[String], mut i: usize) -> (OriginBlock, usize) {
    let mut block = OriginBlock::default();
    while i < tokens.len() {
        let token = &tokens[i];
        if token == "}" {
            return (block, i + 1);
        }

        // Generic directive: `key value;`
        if i + 2 < tokens.len() && tokens[i + 2] == ";" {
            block
                .directives
                .insert(tokens[i].clone(), tokens[i + 1].clone());
            i += 3;
            continue;
        }
        i += 1;
    }
    (block, i)
}

/// Parses the contents inside a `cache { ... }` block.
fn parse_cache_block(tokens: &[String], mut i: usize) -> (CacheBlock, usize) {
    let mut block = CacheBlock::default();
    while i < tokens.len() {
        let token = &tokens[i];
        if token == "}" {
            return (block, i + 1);
        }

        // Parse: `bypass /v1/models;` (repeatable)
        if token == "bypass" && i + 2 < tokens.len() && tokens[i + 2] == ";" {
            block.bypass.push(tokens[i + 1].clone());
            i += 3;
            continue;
        }

        // Generic directive: `key value;`
        if i + 2 < tokens.len() && tokens[i + 2] == ";" {
            block
                .directives
                .insert(tokens[i].clone(), tokens[i + 1].clone());
            i += 3;
            continue;
        }
        i += 1;
    }
    (block, i)
}

/// Basic lexical scanner that breaks a raw configuration string into
/// semantic tokens. Accounts for whitespace separation, comment lines
/// starting with `#`, and the control characters `{`, `}`, `;`. String
/// literals may be wrapped in single or double quotes.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current_token = String::new();
    let mut in_quotes = false;
    let mut in_comment = false;

    for c in input.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }

        if c == '#' && !in_quotes {
            in_comment = true;
            if !current_token.is_empty() {
                tokens.push(current_token.clone());
                current_token.clear();
            }
            continue;
        }

        // Toggle quote state to capture strings with embedded spaces
        if c == '"' || c == '\'' {
            in_quotes = !in_quotes;
            continue;
        }

        if in_quotes {
            current_token.push(c);
            continue;
        }

        // Whitespace acts as a token delimiter
        if c.is_whitespace() {
            if !current_token.is_empty() {
                tokens.push(current_token.clone());
                current_token.clear();
            }
            continue;
        }

        // Structural characters are their own immediate tokens
        if c == '{' || c == '}' || c == ';' {
            if !current_token.is_empty() {
                tokens.push(current_token.clone());
                current_token.clear();
            }
            tokens.push(c.to_string());
            continue;
        }

        // Build up normal text tokens (e.g., words, numbers, paths)
        current_token.push(c);
    }

    if !current_token.is_empty() {
        tokens.push(current_token);
    }

    tokens
}
