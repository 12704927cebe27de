//! Deterministic texts used when no LLM is configured or its output is unusable.

use crate::analysis::reconcile::format_amount;
use crate::domain::profile::RiskLevel;
use crate::domain::recommendation::Recommendation;
use crate::domain::security::{Metric, SecurityMetrics};

/// Renders a computed recommendation in the same `- label: $amount` shape the LLM is
/// asked for, so it parses back through `reconcile::parse_distribution`.
pub fn render_distribution(recommendation: &Recommendation) -> String {
    let mut out = format!(
        "### Distribución de Inversión (Automatizada - {})\n",
        risk_label(recommendation.risk_level)
    );
    for item in &recommendation.items {
        out.push_str(&format!(
            "- {} ({}): ${}\n",
            item.ticker,
            item.name,
            format_amount(item.amount)
        ));
    }
    out.push_str(&format!(
        "TOTAL: ${}\n\n",
        format_amount(recommendation.total_invested)
    ));

    out.push_str(&format!(
        "### Justificación (Perfil {})\n",
        risk_label(recommendation.risk_level)
    ));
    out.push_str(&format!(
        "Distribución automatizada para {} empresas seleccionadas.\n",
        recommendation.items.len()
    ));
    for line in justification(recommendation.risk_level) {
        out.push_str(line);
        out.push('\n');
    }
    for sector in &recommendation.sectors {
        out.push_str(&format!(
            "Sector {}: ${} ({:.1}%)\n",
            sector.sector,
            format_amount(sector.amount),
            sector.percentage
        ));
    }
    out
}

/// Short market read built from the raw fundamentals.
pub fn fallback_analysis(batch: &[SecurityMetrics]) -> String {
    let top_roe = top_names(batch, |s| s.fundamentals.get(Metric::Roe));
    let top_dividends = top_names(batch, |s| s.fundamentals.get(Metric::DividendYield));
    let top_6m = top_names(batch, |s| s.fundamentals.get(Metric::Change6M));

    let lines = [
        "### Informe Financiero (Análisis Automatizado)".to_string(),
        String::new(),
        "**Fundamentales**".to_string(),
        listing_line("Mejor ROE", &top_roe),
        format!(
            "- ROE promedio: {}",
            percent_or_na(mean(batch, |s| s.fundamentals.get(Metric::Roe)))
        ),
        String::new(),
        "**Variación de precio**".to_string(),
        listing_line("Mejores 6M", &top_6m),
        format!(
            "- Variación promedio 6M: {}",
            percent_or_na(mean(batch, |s| s.fundamentals.get(Metric::Change6M)))
        ),
        String::new(),
        "**Riesgo**".to_string(),
        format!(
            "- Beta promedio: {}",
            mean(batch, |s| s.fundamentals.get(Metric::Beta))
                .map(|b| format!("{b:.2}"))
                .unwrap_or_else(|| "N/A".to_string())
        ),
        String::new(),
        "**Dividendos**".to_string(),
        listing_line("Mejores dividendos", &top_dividends),
        format!(
            "- Dividend yield promedio: {}",
            percent_or_na(mean(batch, |s| s.fundamentals.get(Metric::DividendYield)))
        ),
        String::new(),
        "*Análisis automatizado a partir de métricas cuantitativas.*".to_string(),
    ];
    lines.join("\n")
}

pub fn risk_label(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Conservative => "Conservador",
        RiskLevel::Moderate => "Moderado",
        RiskLevel::Aggressive => "Agresivo",
    }
}

fn justification(risk: RiskLevel) -> [&'static str; 3] {
    match risk {
        RiskLevel::Conservative => [
            "Enfoque en empresas estables con dividendos consistentes.",
            "Prioridad a sectores defensivos y menor volatilidad.",
            "Diversificación amplia para reducir riesgo.",
        ],
        RiskLevel::Moderate => [
            "Balance entre estabilidad y crecimiento.",
            "Empresas maduras junto a algunas con potencial.",
            "Diversificación equilibrada entre sectores.",
        ],
        RiskLevel::Aggressive => [
            "Concentración en crecimiento y ROE superior.",
            "Mayor tolerancia a volatilidad por retornos potenciales.",
            "Peso en desempeño reciente y métricas de crecimiento.",
        ],
    }
}

fn top_names(batch: &[SecurityMetrics], metric: impl Fn(&SecurityMetrics) -> Option<f64>) -> Vec<String> {
    let mut ranked: Vec<(f64, &SecurityMetrics)> = batch
        .iter()
        .filter_map(|s| metric(s).filter(|v| v.is_finite()).map(|v| (v, s)))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.ticker.cmp(&b.1.ticker)));
    ranked.into_iter().take(3).map(|(_, s)| s.name.clone()).collect()
}

fn mean(batch: &[SecurityMetrics], metric: impl Fn(&SecurityMetrics) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = batch
        .iter()
        .filter_map(|s| metric(s).filter(|v| v.is_finite()))
        .collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn percent_or_na(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_else(|| "N/A".to_string())
}

fn listing_line(title: &str, names: &[String]) -> String {
    if names.is_empty() {
        format!("- {title}: sin datos suficientes")
    } else {
        format!("- {title}: {}", names.join(", "))
    }
}
