//! Selector fallback tables for the MAT frontend, plus the bounded-wait
//! helpers that probe them.
//!
//! The portal renames classes between releases, so every element of interest
//! carries an ordered list of selector candidates instead of a single string.

use anyhow::Result;
use thirtyfour::{By, WebDriver, WebElement};
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

pub const CAMPO_USUARIO: &[&str] = &["#username", "input[name='username']"];
pub const CAMPO_CLAVE: &[&str] = &["#password", "input[type='password']"];
pub const BOTON_LOGIN: &[&str] = &["#kc-login", "button[type='submit']", "input[type='submit']"];

pub const BOTON_FACTIBILIDAD: &[&str] = &["#Button_Opcion_Top_Fact_Tec"];

pub const ENTRADA_DIRECCION: &[&str] = &["input#direccion", "input[name='direccion']"];
pub const OPCIONES_DIRECCION: &[&str] = &["ul.opciones li", "ul.opciones .item-content"];

pub const ICONO_LUPA: &[&str] = &[
    "label.input_icon--left.icono-lupa",
    "label.icono-lupa",
    ".icono-lupa",
];

pub const PANEL_UNIDAD: &[&str] = &["div.drop_down", "section.drop_down"];
pub const OPCIONES_UNIDAD: &[&str] = &[
    "div.drop_down .item-content",
    "section.drop_down .item-content",
];

pub const MODAL_RESULTADO: &[&str] = &[
    "section.modal_cnt.container-row",
    "section.modal_cnt",
    ".modal_cnt",
];

const INTERVALO_SONDEO: Duration = Duration::from_millis(400);

/// Poll the selector candidates in order until one yields a displayed
/// element or the timeout elapses.
pub async fn find_first_visible(
    driver: &WebDriver,
    selectores: &[&str],
    timeout: Duration,
) -> Option<WebElement> {
    let limite = Instant::now() + timeout;
    loop {
        for selector in selectores {
            let elementos = driver
                .find_all(By::Css(*selector))
                .await
                .unwrap_or_default();
            for elemento in elementos {
                if elemento.is_displayed().await.unwrap_or(false) {
                    debug!("Elemento visible con selector '{}'", selector);
                    return Some(elemento);
                }
            }
        }
        if Instant::now() >= limite {
            return None;
        }
        sleep(INTERVALO_SONDEO).await;
    }
}

/// Displayed elements for the first selector candidate that has any,
/// preserving DOM order.
pub async fn visible_elements(driver: &WebDriver, selectores: &[&str]) -> Vec<WebElement> {
    for selector in selectores {
        let elementos = driver
            .find_all(By::Css(*selector))
            .await
            .unwrap_or_default();
        let mut visibles = Vec::new();
        for elemento in elementos {
            if elemento.is_displayed().await.unwrap_or(false) {
                visibles.push(elemento);
            }
        }
        if !visibles.is_empty() {
            debug!(
                "{} elementos visibles con selector '{}'",
                visibles.len(),
                selector
            );
            return visibles;
        }
    }
    Vec::new()
}

/// True once none of the selector candidates has a displayed element;
/// false if the timeout elapses with something still visible.
pub async fn wait_until_gone(driver: &WebDriver, selectores: &[&str], timeout: Duration) -> bool {
    let limite = Instant::now() + timeout;
    loop {
        let mut visible = false;
        for selector in selectores {
            let elementos = driver
                .find_all(By::Css(*selector))
                .await
                .unwrap_or_default();
            for elemento in elementos {
                if elemento.is_displayed().await.unwrap_or(false) {
                    visible = true;
                    break;
                }
            }
            if visible {
                break;
            }
        }
        if !visible {
            return true;
        }
        if Instant::now() >= limite {
            return false;
        }
        sleep(INTERVALO_SONDEO).await;
    }
}

/// Scroll into view and click; falls back to a JavaScript click when the
/// native one is intercepted by an overlay.
pub async fn click_seguro(driver: &WebDriver, elemento: &WebElement) -> Result<()> {
    let _ = elemento.scroll_into_view().await;
    if elemento.click().await.is_ok() {
        return Ok(());
    }

    debug!("Click directo rechazado; reintentando vía JavaScript");
    driver
        .execute("arguments[0].click();", vec![elemento.to_json()?])
        .await?;
    Ok(())
}
