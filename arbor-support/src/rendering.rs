//! Text rendering for container diagnostics.
//!
//! Error messages and the describing visitor use these helpers to print
//! dependency chains, candidate lists, decorator stacks and "did you mean"
//! hints. Component keys arrive in their display form: type keys as full type
//! names, name keys wrapped in double quotes.

/// Joins a production chain with arrows.
///
/// # Examples
/// ```
/// use arbor_support::rendering::render_chain;
///
/// let chain = ["Left", "Right", "Left"];
/// assert_eq!(render_chain(&chain), "Left → Right → Left");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut rendered = String::new();
    for (i, link) in chain.iter().enumerate() {
        if i > 0 {
            rendered.push_str(" → ");
        }
        rendered.push_str(link.as_ref());
    }
    rendered
}

/// Renders candidate implementation types as `[A, B]`, shortened.
///
/// ```
/// use arbor_support::rendering::render_candidates;
///
/// let rendered = render_candidates(&["app::store::Disk", "app::store::Memory"]);
/// assert_eq!(rendered, "[Disk, Memory]");
/// ```
pub fn render_candidates(candidates: &[impl AsRef<str>]) -> String {
    let names: Vec<String> = candidates
        .iter()
        .map(|c| shorten_type_name(c.as_ref()))
        .collect();
    format!("[{}]", names.join(", "))
}

/// One layer of a component's behavior stack.
#[derive(Debug, Clone)]
pub struct StackLayer {
    /// What the layer adds, e.g. `Cached` or `Locked`
    pub descriptor: String,
    /// The component key the layer serves
    pub key: String,
}

/// Renders the layers wrapped around one component, outermost first.
///
/// ```text
/// StaticInjection   (UserService)
///       ↓
/// Cached+Lifecycle  (UserService)
///       ↓
/// Instance          (UserService)
/// ```
pub fn render_stack(layers: &[StackLayer]) -> String {
    let width = layers
        .iter()
        .map(|l| l.descriptor.chars().count())
        .max()
        .unwrap_or(0);

    let mut rendered = String::new();
    for (i, layer) in layers.iter().enumerate() {
        if i > 0 {
            rendered.push_str("      ↓\n");
        }
        rendered.push_str(&format!("{:<width$}  ({})\n", layer.descriptor, layer.key));
    }
    rendered
}

/// Drops module paths from every path in a type name, keeping generics.
///
/// ```
/// use arbor_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::store::Disk"), "Disk");
/// assert_eq!(
///     shorten_type_name("arbor_container::provider::Provider<app::store::Disk>"),
///     "Provider<Disk>"
/// );
/// assert_eq!(shorten_type_name("dyn app::Clock"), "dyn Clock");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut shortened = String::with_capacity(full_name.len());
    let mut start = 0;

    for (i, ch) in full_name.char_indices() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';') {
            shortened.push_str(last_segment(&full_name[start..i]));
            shortened.push(ch);
            start = i + ch.len_utf8();
        }
    }
    shortened.push_str(last_segment(&full_name[start..]));
    shortened
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// "Did you mean" candidates for a key nothing was registered under.
///
/// Name keys are compared without their quotes and type keys by their short
/// names. Results keep the display form they were given in, best match first.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let wanted = comparable(requested);
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &str)> = available
        .iter()
        .filter_map(|&candidate| {
            let have = comparable(candidate);
            if have == wanted {
                return None;
            }
            similarity(&wanted, &have).map(|score| (score, candidate))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

fn comparable(key: &str) -> String {
    shorten_type_name(key.trim_matches('"')).to_lowercase()
}

fn similarity(wanted: &str, have: &str) -> Option<usize> {
    if have.contains(wanted) || wanted.contains(have) {
        return Some(100);
    }
    if edit_distance(wanted, have) <= 2 {
        return Some(90);
    }

    let shared_prefix = wanted
        .chars()
        .zip(have.chars())
        .take_while(|(a, b)| a == b)
        .count();
    (shared_prefix >= 3).then_some(shared_prefix * 10)
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}
