mod selectors;

use anyhow::{Context, Result};
use rand::Rng;
use scraper::{Html, Selector};
use serde::Serialize;
use thirtyfour::prelude::*;
use thirtyfour::Key;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::matching;
use crate::request::{ConsultaRequest, UnitQuery};

/// SSO entry point of the customer-care portal. The query parameters are the
/// ones the portal itself issues; it accepts replays of them.
const LOGIN_URL: &str = "https://sso-ocp4-sr-amp.apps.sr-ocp.wom.cl/auth/realms/customer-care/protocol/openid-connect/auth?client_id=e7c0d592&redirect_uri=https%3A%2F%2Fcustomercareapplicationservice.ose.wom.cl%2Fwomac%2Flogin&state=d213955b-7112-4036-b60d-a4b79940cde5&response_mode=fragment&response_type=code&scope=openid&nonce=43e8fbde-b45e-46db-843f-4482bbed44b2/";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("ninguna opción del autocompletado coincidió con la dirección ({} variantes intentadas)", .attempted.len())]
    AddressNotResolved { attempted: Vec<String> },
    #[error("no se encontró una opción de torre/depto que coincida")]
    UnitNotResolved,
}

/// Behavioral knobs for one portal session. Passed in per run; there is no
/// shared module-level state.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub headless: bool,
    /// Upper bound for every wait on a UI condition.
    pub timeout_secs: u64,
    /// Base delay between keystrokes when typing into the autocomplete.
    pub type_delay_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_secs: 15,
            type_delay_ms: 80,
        }
    }
}

/// Outcome of one feasibility lookup.
#[derive(Debug, Clone, Serialize)]
pub struct ConsultaReport {
    /// Text of the autocomplete option that was selected.
    pub opcion_direccion: String,
    /// Text of the torre/depto option, when one was selected.
    pub opcion_unidad: Option<String>,
    /// A torre/depto was requested but no option matched; the base address
    /// still stands.
    pub unidad_sin_resolver: bool,
    /// Visible text of the result modal, when it could be read back.
    pub resumen: Option<String>,
    /// PNG capture of the result panel (or full page as fallback).
    #[serde(skip)]
    pub captura: Vec<u8>,
}

/// One exclusively-owned browser session against the MAT portal.
pub struct WomPortal {
    driver: WebDriver,
    usuario: String,
    clave: String,
    config: PortalConfig,
}

impl WomPortal {
    pub async fn new(
        usuario: String,
        clave: String,
        webdriver_url: &str,
        config: PortalConfig,
    ) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.add_chrome_arg("--headless")?;
        }
        caps.add_chrome_arg("--no-sandbox")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg("--disable-gpu")?;
        caps.add_chrome_arg("--window-size=1366,900")?;
        caps.add_chrome_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_chrome_arg("--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36")?;

        let driver = WebDriver::new(webdriver_url, caps)
            .await
            .context("No se pudo conectar al WebDriver")?;

        driver
            .set_page_load_timeout(Duration::from_secs(60))
            .await?;
        driver.set_script_timeout(Duration::from_secs(30)).await?;

        Ok(Self {
            driver,
            usuario,
            clave,
            config,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Fill the SSO form and submit it.
    pub async fn login(&self) -> Result<()> {
        info!("Iniciando sesión en el portal WOM...");

        self.driver
            .goto(LOGIN_URL)
            .await
            .context("No se pudo cargar la página de inicio de sesión")?;
        sleep(Duration::from_secs(3)).await;

        let campo_usuario =
            selectors::find_first_visible(&self.driver, selectors::CAMPO_USUARIO, self.timeout())
                .await
                .context("No se encontró el campo de usuario")?;
        campo_usuario.clear().await?;
        campo_usuario.send_keys(&self.usuario).await?;
        debug!("Campo de usuario completado");

        let campo_clave =
            selectors::find_first_visible(&self.driver, selectors::CAMPO_CLAVE, self.timeout())
                .await
                .context("No se encontró el campo de contraseña")?;
        campo_clave.clear().await?;
        campo_clave.send_keys(&self.clave).await?;
        debug!("Campo de contraseña completado");

        let boton =
            selectors::find_first_visible(&self.driver, selectors::BOTON_LOGIN, self.timeout())
                .await
                .context("No se encontró el botón de inicio de sesión")?;
        selectors::click_seguro(&self.driver, &boton).await?;
        sleep(Duration::from_secs(5)).await;

        info!("Inicio de sesión enviado");
        Ok(())
    }

    /// Run the full lookup against an already logged-in session: open the
    /// feasibility section, resolve the address, refine by torre/depto and
    /// capture the result panel.
    pub async fn consultar(&self, request: &ConsultaRequest) -> Result<ConsultaReport> {
        self.abrir_factibilidad().await?;

        let opcion_direccion = match self.resolver_direccion(request).await {
            Ok(texto) => texto,
            Err(err) => {
                self.guardar_diagnostico("direccion").await;
                return Err(err);
            }
        };

        let unidad = UnitQuery::de_request(request);
        let (opcion_unidad, unidad_sin_resolver) = match self.seleccionar_unidad(&unidad).await {
            Ok(seleccion) => (seleccion, false),
            Err(err) if es_unidad_sin_resolver(&err) => {
                if unidad.esta_vacia() {
                    debug!("Sin panel de torre/depto aplicable; se continúa con la dirección base");
                    (None, false)
                } else {
                    warn!("No se encontró la torre/depto pedida; se continúa con la dirección base");
                    (None, true)
                }
            }
            Err(err) => return Err(err),
        };

        let captura = self.capturar_resultado().await?;
        let resumen = self
            .driver
            .source()
            .await
            .ok()
            .and_then(|html| resumen_resultado(&html));

        Ok(ConsultaReport {
            opcion_direccion,
            opcion_unidad,
            unidad_sin_resolver,
            resumen,
            captura,
        })
    }

    /// Close the browser. Call on every exit path.
    pub async fn close(self) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }

    async fn abrir_factibilidad(&self) -> Result<()> {
        let boton = selectors::find_first_visible(
            &self.driver,
            selectors::BOTON_FACTIBILIDAD,
            self.timeout(),
        )
        .await
        .context("No se encontró el botón de Factibilidad Técnica")?;
        selectors::click_seguro(&self.driver, &boton).await?;
        sleep(Duration::from_secs(2)).await;

        info!("Sección de Factibilidad Técnica abierta");
        Ok(())
    }

    /// Type one query into the address field, discarding whatever the
    /// previous attempt left there.
    async fn escribir_consulta(&self, texto: &str) -> Result<()> {
        let campo = selectors::find_first_visible(
            &self.driver,
            selectors::ENTRADA_DIRECCION,
            self.timeout(),
        )
        .await
        .context("No se encontró un campo de dirección visible")?;

        let _ = campo.scroll_into_view().await;
        campo.click().await?;
        campo.clear().await?;
        sleep(Duration::from_millis(300)).await;

        for caracter in texto.chars() {
            campo.send_keys(caracter.to_string()).await?;
            let pausa = {
                let mut rng = rand::thread_rng();
                rng.gen_range(self.config.type_delay_ms..self.config.type_delay_ms + 40)
            };
            sleep(Duration::from_millis(pausa)).await;
        }

        // The autocomplete sometimes swallows the last keystroke; a trailing
        // backspace makes it refresh with a broader prefix.
        sleep(Duration::from_secs(2)).await;
        campo.send_keys(Key::Backspace.to_string()).await?;
        sleep(Duration::from_millis(1500)).await;

        Ok(())
    }

    async fn listar_opciones(&self, selectores: &[&str]) -> Vec<(WebElement, String)> {
        let elementos = selectors::visible_elements(&self.driver, selectores).await;
        let mut opciones = Vec::with_capacity(elementos.len());
        for elemento in elementos {
            let texto = elemento
                .text()
                .await
                .unwrap_or_default()
                .trim()
                .to_string();
            if !texto.is_empty() {
                opciones.push((elemento, texto));
            }
        }
        opciones
    }

    /// Four-tier address resolution: exact pair, zero-padded number,
    /// street-type prefixes, then the first plausible option.
    async fn resolver_direccion(&self, request: &ConsultaRequest) -> Result<String> {
        let variantes = matching::query_variants(&request.calle, &request.numero);
        let mut intentadas = Vec::with_capacity(variantes.len());
        let mut ultima_lista: Vec<(WebElement, String)> = Vec::new();

        for variante in &variantes {
            info!("Probando variante de dirección: {}", variante.consulta);
            self.escribir_consulta(&variante.consulta).await?;

            let opciones = self.listar_opciones(selectors::OPCIONES_DIRECCION).await;
            let textos: Vec<String> = opciones.iter().map(|(_, texto)| texto.clone()).collect();
            debug!("{} opciones visibles en el autocompletado", textos.len());

            if let Some(idx) =
                matching::pick_address_option(&textos, &request.calle, &variante.numero)
            {
                let (elemento, texto) = &opciones[idx];
                info!("Dirección coincidente: {}", texto);
                selectors::click_seguro(&self.driver, elemento).await?;
                sleep(Duration::from_secs(1)).await;
                self.confirmar_seleccion().await?;
                return Ok(texto.clone());
            }

            intentadas.push(variante.consulta.clone());
            ultima_lista = opciones;
        }

        // Last resort: the first option still listed, but only if it
        // plausibly names a dwelling; otherwise fail instead of guessing.
        if let Some((elemento, texto)) = ultima_lista.first() {
            if matching::looks_like_unit_option(texto) {
                warn!(
                    "Sin coincidencia exacta; usando la primera opción plausible: {}",
                    texto
                );
                selectors::click_seguro(&self.driver, elemento).await?;
                sleep(Duration::from_secs(1)).await;
                self.confirmar_seleccion().await?;
                return Ok(texto.clone());
            }
            debug!(
                "La primera opción '{}' no parece una dirección; se descarta",
                texto
            );
        }

        Err(ResolveError::AddressNotResolved {
            attempted: intentadas,
        }
        .into())
    }

    /// The portal asks for a secondary confirmation (a magnifying-glass
    /// icon) after the base address is selected; the torre/depto panel only
    /// appears after it.
    async fn confirmar_seleccion(&self) -> Result<()> {
        match selectors::find_first_visible(
            &self.driver,
            selectors::ICONO_LUPA,
            Duration::from_secs(3),
        )
        .await
        {
            Some(lupa) => {
                info!("Confirmando la selección con click en la lupa");
                selectors::click_seguro(&self.driver, &lupa).await?;
                sleep(Duration::from_millis(2500)).await;
            }
            None => debug!("No apareció la lupa de confirmación; se continúa"),
        }
        Ok(())
    }

    /// Pick the torre/depto option that best matches the request. `Ok(None)`
    /// means the address simply has no unit panel (a house, typically).
    async fn seleccionar_unidad(&self, unidad: &UnitQuery) -> Result<Option<String>> {
        let espera_panel = Duration::from_secs(self.config.timeout_secs.min(8));
        if selectors::find_first_visible(&self.driver, selectors::PANEL_UNIDAD, espera_panel)
            .await
            .is_none()
        {
            if unidad.esta_vacia() {
                debug!("No apareció panel de torre/depto; la dirección no ofrece unidades");
                return Ok(None);
            }
            return Err(ResolveError::UnitNotResolved.into());
        }

        let opciones = self.listar_opciones(selectors::OPCIONES_UNIDAD).await;
        let textos: Vec<String> = opciones.iter().map(|(_, texto)| texto.clone()).collect();
        info!("{} opciones de torre/depto desplegadas", textos.len());
        for (idx, texto) in textos.iter().enumerate() {
            debug!("  {}. {}", idx + 1, texto);
        }

        let idx = matching::pick_unit_option(&textos, unidad).ok_or(ResolveError::UnitNotResolved)?;
        let (elemento, texto) = &opciones[idx];
        info!("Seleccionando torre/depto: {}", texto);
        selectors::click_seguro(&self.driver, elemento).await?;

        // The drop-down closing is the signal that the click registered.
        if !selectors::wait_until_gone(
            &self.driver,
            selectors::PANEL_UNIDAD,
            Duration::from_secs(5),
        )
        .await
        {
            warn!("El panel de torre/depto sigue visible; reintentando con click por JavaScript");
            self.driver
                .execute("arguments[0].click();", vec![elemento.to_json()?])
                .await?;
            let _ = selectors::wait_until_gone(
                &self.driver,
                selectors::PANEL_UNIDAD,
                Duration::from_secs(5),
            )
            .await;
        }

        Ok(Some(texto.clone()))
    }

    /// Capture the result modal; full-page shot when it never shows up.
    async fn capturar_resultado(&self) -> Result<Vec<u8>> {
        if let Some(modal) = selectors::find_first_visible(
            &self.driver,
            selectors::MODAL_RESULTADO,
            self.timeout(),
        )
        .await
        {
            info!("Modal de resultado visible; capturando el panel");
            sleep(Duration::from_millis(500)).await;
            return Ok(modal.screenshot_as_png().await?);
        }

        warn!("El modal de resultado no apareció a tiempo; se captura la página completa");
        if let Some(lupa) = selectors::find_first_visible(
            &self.driver,
            selectors::ICONO_LUPA,
            Duration::from_secs(2),
        )
        .await
        {
            info!("Lupa pendiente antes de la captura; haciendo click");
            let _ = selectors::click_seguro(&self.driver, &lupa).await;
            sleep(Duration::from_secs(4)).await;
        }

        Ok(self.driver.screenshot_as_png().await?)
    }

    /// Best-effort full-page capture for post-mortem when a stage fails.
    async fn guardar_diagnostico(&self, etapa: &str) {
        match self.driver.screenshot_as_png().await {
            Ok(bytes) => {
                let ruta = format!(
                    "factibilidad_error_{}_{}.png",
                    etapa,
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                );
                match std::fs::write(&ruta, bytes) {
                    Ok(()) => warn!("Captura de diagnóstico guardada en {}", ruta),
                    Err(err) => warn!("No se pudo guardar la captura de diagnóstico: {}", err),
                }
            }
            Err(err) => warn!("No se pudo tomar la captura de diagnóstico: {}", err),
        }
    }
}

fn es_unidad_sin_resolver(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ResolveError>(),
        Some(ResolveError::UnitNotResolved)
    )
}

/// Visible text of the result modal, extracted from the page source.
pub fn resumen_resultado(html: &str) -> Option<String> {
    let documento = Html::parse_document(html);
    let selector = Selector::parse("section.modal_cnt").unwrap();
    let modal = documento.select(&selector).next()?;

    let texto = modal
        .text()
        .map(str::trim)
        .filter(|fragmento| !fragmento.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if texto.is_empty() {
        None
    } else {
        Some(texto)
    }
}
