// Player name normalization for registry lookups.
//
// Source tables disagree on accents and spacing ("José Ramírez" vs
// "Jose Ramirez"), so both exact and fuzzy search compare folded forms.

/// Fold a name for comparison: trim, lowercase, and strip common Latin
/// diacritics to their ASCII base letter. Characters outside the fold table
/// pass through lowercased.
pub fn fold(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match fold_char(ch) {
            Some(ascii) => out.push_str(ascii),
            None => out.extend(ch.to_lowercase()),
        }
    }
    out
}

/// Join last and first into the folded "first last" form used for fuzzy
/// scoring.
pub fn folded_full(last: &str, first: &str) -> String {
    let first = fold(first);
    let last = fold(last);
    if first.is_empty() {
        last
    } else {
        format!("{first} {last}")
    }
}

fn fold_char(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => "a",
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => "e",
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => "i",
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => "o",
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => "u",
        'ñ' | 'Ñ' => "n",
        'ç' | 'Ç' => "c",
        'ý' | 'ÿ' | 'Ý' => "y",
        _ => return None,
    };
    Some(folded)
}
