//! Pure matching logic for the MAT autocomplete and the torre/depto panel.
//!
//! Everything here works on plain strings so it can be exercised without a
//! browser; the portal module feeds it the option texts it scrapes.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::request::UnitQuery;

/// Street-type prefixes tried when the bare street name yields nothing.
pub const PREFIJOS_CALLE: [&str; 3] = ["", "Calle ", "Avenida "];

/// Labels the portal uses for a tower/building block.
pub const ETIQUETAS_TORRE: [&str; 3] = ["TORRE", "BLOCK", "EDIFICIO"];

/// Labels the portal uses for an apartment/unit.
pub const ETIQUETAS_DEPTO: [&str; 3] = ["DEPTO", "DEPARTAMENTO", "DTO"];

const PALABRAS_VIVIENDA: [&str; 6] = ["TORRE", "DEPTO", "PISO", "CASA", "BLOCK", "EDIFICIO"];

/// Uppercase, strip accents and collapse whitespace.
///
/// The portal renders option texts with inconsistent accents and casing, so
/// every comparison goes through this first.
pub fn normalizar(texto: &str) -> String {
    texto
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(texto: &str) -> Vec<String> {
    normalizar(texto)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// One query string typed into the autocomplete field, paired with the
/// number variant the containment test must use for that attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryVariant {
    pub consulta: String,
    pub numero: String,
}

impl QueryVariant {
    fn new(consulta: String, numero: &str) -> Self {
        Self {
            consulta,
            numero: numero.to_string(),
        }
    }
}

/// The fixed attempt order for address resolution.
///
/// First the street as given with the number as given, then with the number
/// zero-padded, then every street-type prefix crossed with both number
/// variants. The cross includes the bare-street pairs again; retyping an
/// already-tried query is harmless and keeps the order trivial to audit.
pub fn query_variants(calle: &str, numero: &str) -> Vec<QueryVariant> {
    let con_cero = format!("0{numero}");

    let mut variantes = vec![
        QueryVariant::new(format!("{calle} {numero}"), numero),
        QueryVariant::new(format!("{calle} {con_cero}"), &con_cero),
    ];
    for prefijo in PREFIJOS_CALLE {
        for num in [numero, con_cero.as_str()] {
            variantes.push(QueryVariant::new(format!("{prefijo}{calle} {num}"), num));
        }
    }
    variantes
}

/// Index of the first candidate containing both the street and the number
/// variant as substrings, after normalization. List order is the portal's own
/// relevance ranking, so ties go to the earliest entry.
pub fn pick_address_option(candidatas: &[String], calle: &str, numero: &str) -> Option<usize> {
    let calle_norm = normalizar(calle);
    let numero_norm = normalizar(numero);

    candidatas.iter().position(|texto| {
        let texto_norm = normalizar(texto);
        texto_norm.contains(&calle_norm) && texto_norm.contains(&numero_norm)
    })
}

/// Whole-word adjacency test: some label from `etiquetas` immediately
/// followed by `token`, both as standalone words.
///
/// "TORRE B DEPTO 203" matches token "B" against the tower labels, while a
/// stray "B" elsewhere in the text, or "TORRE 2B", does not. Tokens come from
/// user input, so this deliberately avoids building a regex out of them.
pub fn label_token_adjacent(texto: &str, etiquetas: &[&str], token: &str) -> bool {
    let buscado = normalizar(token);
    if buscado.is_empty() {
        return false;
    }

    tokens(texto)
        .windows(2)
        .any(|par| etiquetas.contains(&par[0].as_str()) && par[1] == buscado)
}

/// Weighted match of one candidate against the requested torre/depto.
///
/// An absent token is a wildcard and counts as matched, so with neither field
/// supplied every candidate scores 4 and list order decides.
pub fn score_unit_option(texto: &str, unidad: &UnitQuery) -> u8 {
    let torre_ok = match &unidad.torre_token {
        None => true,
        Some(token) => label_token_adjacent(texto, &ETIQUETAS_TORRE, token),
    };
    let depto_ok = match &unidad.depto_token {
        None => true,
        Some(token) => label_token_adjacent(texto, &ETIQUETAS_DEPTO, token),
    };

    2 * u8::from(torre_ok) + 2 * u8::from(depto_ok)
}

/// Highest-scoring candidate, first occurrence winning ties. The winner must
/// still look like a dwelling option; otherwise selection fails rather than
/// clicking an unrelated element.
pub fn pick_unit_option(candidatas: &[String], unidad: &UnitQuery) -> Option<usize> {
    let mut mejor: Option<(usize, u8)> = None;
    for (idx, texto) in candidatas.iter().enumerate() {
        let puntaje = score_unit_option(texto, unidad);
        if mejor.map(|(_, p)| puntaje > p).unwrap_or(true) {
            mejor = Some((idx, puntaje));
        }
    }

    let (idx, _) = mejor?;
    looks_like_unit_option(&candidatas[idx]).then_some(idx)
}

/// Loose plausibility test for a dwelling/address option: a known dwelling
/// keyword anywhere in the text, or the whole text being a bare block letter
/// (A-F) or a 1-3 digit run, the way the panel labels single units.
pub fn looks_like_unit_option(texto: &str) -> bool {
    let norm = normalizar(texto);
    if PALABRAS_VIVIENDA
        .iter()
        .any(|palabra| norm.contains(palabra))
    {
        return true;
    }

    if norm.len() == 1 && matches!(norm.chars().next(), Some('A'..='F')) {
        return true;
    }

    (1..=3).contains(&norm.len()) && norm.chars().all(|c| c.is_ascii_digit())
}
