use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::time::Instant;
use tracing::{info, warn};

use factibilidad_cli::matching;
use factibilidad_cli::portal::{ConsultaReport, PortalConfig, ResolveError, WomPortal};
use factibilidad_cli::request::{ConsultaRequest, UnitQuery};

fn prompt_non_empty(prompt: &str) -> Result<String> {
    loop {
        print!("{}", prompt);
        io::stdout()
            .flush()
            .context("No se pudo vaciar stdout al pedir datos")?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .context("No se pudo leer la entrada")?;

        let trimmed = input.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }

        println!("El valor no puede estar vacío. Intenta de nuevo.\n");
    }
}

fn resolve_credential(value: Option<String>, env_key: &str, prompt: &str) -> Result<String> {
    if let Some(val) = value {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    if let Ok(val) = std::env::var(env_key) {
        if !val.trim().is_empty() {
            return Ok(val);
        }
    }
    prompt_non_empty(prompt)
}

fn ruta_captura_por_defecto() -> String {
    format!(
        "factibilidad_{}.png",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// One session per run: connect, log in, consult, always close.
async fn ejecutar_consulta(
    request: &ConsultaRequest,
    usuario: &str,
    clave: &str,
    webdriver_url: &str,
    config: PortalConfig,
) -> Result<ConsultaReport> {
    info!(
        "Conectando al portal como {} para consultar {} {}",
        usuario, request.calle, request.numero
    );

    let portal = WomPortal::new(
        usuario.to_string(),
        clave.to_string(),
        webdriver_url,
        config,
    )
    .await?;

    let resultado = async {
        portal.login().await?;
        portal.consultar(request).await
    }
    .await;

    if let Err(err) = portal.close().await {
        warn!(
            "No se pudo cerrar la sesión del navegador limpiamente: {}",
            err
        );
    }

    resultado
}

fn mostrar_reporte(report: &ConsultaReport, ruta_captura: &str, segundos: f64) {
    println!("\n========== Resultado de la consulta ==========");
    println!("Dirección seleccionada: {}", report.opcion_direccion);
    match (&report.opcion_unidad, report.unidad_sin_resolver) {
        (Some(unidad), _) => println!("Torre/Depto:            {}", unidad),
        (None, true) => {
            println!("Torre/Depto:            sin coincidencia (se usó la dirección base)")
        }
        (None, false) => println!("Torre/Depto:            no aplica"),
    }
    if let Some(resumen) = &report.resumen {
        println!("Resumen del portal:     {}", resumen);
    }
    println!("Captura guardada en:    {}", ruta_captura);
    println!("Duración:               {:.1}s", segundos);
}

#[derive(Parser)]
#[command(name = "factibilidad-cli")]
#[command(about = "Consulta de factibilidad técnica en el MAT de WOM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ejecuta una consulta de punta a punta y guarda la captura del resultado
    Consultar {
        /// Dirección con el formato "Región, Comuna, Calle, Número[, Torre[, Depto]]"
        direccion: String,

        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        headless: bool,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        webdriver_url: Option<String>,

        /// Ruta del PNG de salida (por defecto, un nombre con fecha y hora)
        #[arg(short, long)]
        output: Option<String>,

        /// Imprime el resultado como JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Analiza la dirección y muestra las variantes que se intentarían
    Validar { direccion: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Consultar {
            direccion,
            headless,
            username,
            password,
            webdriver_url,
            output,
            json,
        } => {
            let inicio = Instant::now();

            let request = match ConsultaRequest::parse(&direccion) {
                Ok(request) => request,
                Err(err) => {
                    eprintln!("❗ {}", err);
                    eprintln!(
                        "Ejemplo: factibilidad-cli consultar \"Metropolitana, Providencia, Av Providencia, 1234\""
                    );
                    return Err(err.into());
                }
            };

            let usuario = resolve_credential(username, "WOM_USER", "Usuario WOM: ")?;
            let clave = resolve_credential(password, "WOM_PASS", "Contraseña WOM: ")?;
            let webdriver_url = webdriver_url
                .or_else(|| std::env::var("WOM_WEBDRIVER_URL").ok())
                .unwrap_or_else(|| "http://localhost:9515".to_string());

            let config = PortalConfig {
                headless,
                ..PortalConfig::default()
            };

            match ejecutar_consulta(&request, &usuario, &clave, &webdriver_url, config).await {
                Ok(report) => {
                    let ruta = output.unwrap_or_else(ruta_captura_por_defecto);
                    std::fs::write(&ruta, &report.captura)
                        .with_context(|| format!("No se pudo guardar la captura en {}", ruta))?;

                    let segundos = inicio.elapsed().as_secs_f64();
                    if json {
                        let mut salida = serde_json::to_value(&report)?;
                        salida["captura"] = serde_json::Value::String(ruta.clone());
                        salida["segundos"] = serde_json::json!(segundos);
                        println!("{}", serde_json::to_string_pretty(&salida)?);
                    } else {
                        mostrar_reporte(&report, &ruta, segundos);
                    }
                }
                Err(err) => {
                    if let Some(ResolveError::AddressNotResolved { attempted }) =
                        err.downcast_ref()
                    {
                        eprintln!("❌ No se pudo resolver la dirección. Variantes intentadas:");
                        for variante in attempted {
                            eprintln!("  - {}", variante);
                        }
                    }
                    return Err(err);
                }
            }
        }

        Commands::Validar { direccion } => {
            let request = ConsultaRequest::parse(&direccion)?;
            let unidad = UnitQuery::de_request(&request);

            println!("Región:  {}", request.region);
            println!("Comuna:  {}", request.comuna);
            println!("Calle:   {}", request.calle);
            println!("Número:  {}", request.numero);
            println!("Torre:   {}", request.torre.as_deref().unwrap_or("-"));
            println!("Depto:   {}", request.depto.as_deref().unwrap_or("-"));
            if let Some(token) = &unidad.torre_token {
                println!("Token de torre: {}", token);
            }
            if let Some(token) = &unidad.depto_token {
                println!("Token de depto: {}", token);
            }

            println!("\nVariantes de búsqueda, en orden:");
            for (idx, variante) in matching::query_variants(&request.calle, &request.numero)
                .iter()
                .enumerate()
            {
                println!("  {:>2}. {}", idx + 1, variante.consulta);
            }
        }
    }

    Ok(())
}
