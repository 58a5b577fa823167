use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command grammar shown to the user when a required field is missing.
pub const FORMATO: &str = "Región, Comuna, Calle, Número[, Torre[, Depto]]";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Falta el campo obligatorio '{0}'. Formato: {}", FORMATO)]
    CampoFaltante(&'static str),
}

/// Parsed feasibility request, one per incoming command.
///
/// `torre` and `depto` are optional refinements; the other four fields are
/// required and guaranteed non-empty after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultaRequest {
    pub region: String,
    pub comuna: String,
    pub calle: String,
    pub numero: String,
    pub torre: Option<String>,
    pub depto: Option<String>,
}

impl ConsultaRequest {
    /// Split a comma-delimited command string into its positional fields.
    ///
    /// Whitespace-only fields count as missing. Empty torre/depto fields are
    /// treated as absent, and anything past the sixth comma is ignored.
    pub fn parse(input: &str) -> Result<Self, InputError> {
        let partes: Vec<&str> = input.split(',').map(str::trim).collect();

        let obligatorio = |idx: usize, nombre: &'static str| -> Result<String, InputError> {
            match partes.get(idx) {
                Some(valor) if !valor.is_empty() => Ok((*valor).to_string()),
                _ => Err(InputError::CampoFaltante(nombre)),
            }
        };
        let opcional = |idx: usize| -> Option<String> {
            partes
                .get(idx)
                .filter(|valor| !valor.is_empty())
                .map(|valor| (*valor).to_string())
        };

        let region = obligatorio(0, "región")?;
        let comuna = obligatorio(1, "comuna")?;
        let calle = ajustar_calle_por_region(&region, &obligatorio(2, "calle")?);
        let numero = obligatorio(3, "número")?;

        Ok(Self {
            region,
            comuna,
            calle,
            numero,
            torre: opcional(4),
            depto: opcional(5),
        })
    }
}

fn es_region_ohiggins(region: &str) -> bool {
    region
        .trim()
        .replace('’', "'")
        .eq_ignore_ascii_case("Libertador Bernardo O'Higgins")
}

/// The MAT autocomplete indexes O'Higgins streets under an abbreviated name,
/// so the long form never matches. One fixed substitution, applied only when
/// the request is for that region.
pub fn ajustar_calle_por_region(region: &str, calle: &str) -> String {
    if !es_region_ohiggins(region) {
        return calle.to_string();
    }

    let patron = RegexBuilder::new(r"LIBERTADOR BERNARDO O['’]HIGGINS")
        .case_insensitive(true)
        .build()
        .unwrap();
    patron
        .replace_all(calle, "LIB GRAL BERNARDO O HIGGINS")
        .into_owned()
}

/// Normalized tower/unit tokens extracted from the optional request fields.
///
/// An absent token is a wildcard during scoring. "Torre B" keeps only its
/// last word, so the token compared against candidate text is just "B".
#[derive(Debug, Clone, Default)]
pub struct UnitQuery {
    pub torre_token: Option<String>,
    pub depto_token: Option<String>,
}

impl UnitQuery {
    pub fn de_request(request: &ConsultaRequest) -> Self {
        let torre_token = request
            .torre
            .as_deref()
            .and_then(|torre| torre.split_whitespace().last())
            .map(str::to_uppercase);
        let depto_token = request
            .depto
            .as_deref()
            .map(str::trim)
            .filter(|depto| !depto.is_empty())
            .map(str::to_uppercase);

        Self {
            torre_token,
            depto_token,
        }
    }

    pub fn esta_vacia(&self) -> bool {
        self.torre_token.is_none() && self.depto_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completo() {
        let req =
            ConsultaRequest::parse("Metropolitana, Providencia, Av Providencia, 1234").unwrap();
        assert_eq!(req.region, "Metropolitana");
        assert_eq!(req.comuna, "Providencia");
        assert_eq!(req.calle, "Av Providencia");
        assert_eq!(req.numero, "1234");
        assert!(req.torre.is_none());
        assert!(req.depto.is_none());
    }

    #[test]
    fn test_parse_con_torre_y_depto() {
        let req = ConsultaRequest::parse("Metropolitana, Ñuñoa, Irarrázaval, 3000, Torre B, 203")
            .unwrap();
        assert_eq!(req.torre.as_deref(), Some("Torre B"));
        assert_eq!(req.depto.as_deref(), Some("203"));
    }

    #[test]
    fn test_parse_rechaza_campos_faltantes() {
        assert!(ConsultaRequest::parse("Metropolitana, Providencia, Av Providencia").is_err());
        assert!(ConsultaRequest::parse("Metropolitana, , Av Providencia, 1234").is_err());
        assert!(ConsultaRequest::parse("Metropolitana, Providencia,   , 1234").is_err());
        assert!(ConsultaRequest::parse("").is_err());
    }

    #[test]
    fn test_parse_torre_vacia_es_ausente() {
        let req = ConsultaRequest::parse("a, b, c, 1, , ").unwrap();
        assert!(req.torre.is_none());
        assert!(req.depto.is_none());
    }

    #[test]
    fn test_sustitucion_ohiggins() {
        let calle = ajustar_calle_por_region(
            "Libertador Bernardo O'Higgins",
            "Av Libertador Bernardo O'Higgins",
        );
        assert_eq!(calle, "Av LIB GRAL BERNARDO O HIGGINS");

        // Curly apostrophe in both region and street
        let calle = ajustar_calle_por_region(
            "libertador bernardo o’higgins",
            "Avenida LIBERTADOR BERNARDO O’HIGGINS 250",
        );
        assert_eq!(calle, "Avenida LIB GRAL BERNARDO O HIGGINS 250");
    }

    #[test]
    fn test_sustitucion_es_idempotente() {
        let una = ajustar_calle_por_region(
            "Libertador Bernardo O'Higgins",
            "Av Libertador Bernardo O'Higgins",
        );
        let dos = ajustar_calle_por_region("Libertador Bernardo O'Higgins", &una);
        assert_eq!(una, dos);
    }

    #[test]
    fn test_sustitucion_no_aplica_en_otras_regiones() {
        let calle =
            ajustar_calle_por_region("Metropolitana", "Av Libertador Bernardo O'Higgins");
        assert_eq!(calle, "Av Libertador Bernardo O'Higgins");
    }

    #[test]
    fn test_unit_query_tokens() {
        let req = ConsultaRequest::parse("r, c, calle, 1, Torre B, 203").unwrap();
        let unidad = UnitQuery::de_request(&req);
        assert_eq!(unidad.torre_token.as_deref(), Some("B"));
        assert_eq!(unidad.depto_token.as_deref(), Some("203"));
        assert!(!unidad.esta_vacia());

        let req = ConsultaRequest::parse("r, c, calle, 1").unwrap();
        assert!(UnitQuery::de_request(&req).esta_vacia());
    }
}
