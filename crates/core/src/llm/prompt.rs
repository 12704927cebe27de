use crate::analysis::allocate::{ceil_to_unit, selection_size};
use crate::analysis::reconcile::format_amount;
use crate::config::AnalysisConfig;
use crate::domain::profile::RiskLevel;
use crate::domain::recommendation::ScoreRecord;
use crate::domain::security::SecurityMetrics;
use crate::llm::TextRequest;

const ANALYST_INSTRUCTIONS: &str = "Eres un analista financiero senior especializado en la bolsa chilena y debes responder solo con el formato solicitado.";
const ADVISOR_INSTRUCTIONS: &str = "Eres un asesor financiero senior especializado en la bolsa chilena y debes responder solo con el formato solicitado.";

pub fn business_analysis_request(batch: &[SecurityMetrics]) -> TextRequest {
    let payers: Vec<&SecurityMetrics> = batch.iter().filter(|s| s.pays_dividends()).collect();
    let rows: Vec<&SecurityMetrics> = if payers.is_empty() {
        batch.iter().collect()
    } else {
        payers
    };

    let input = format!(
        "Evalúa de manera objetiva, breve y comparativa estas empresas:\n\n{}\n\n\
### Instrucciones\n\
- Usa Markdown con los títulos indicados.\n\
- Frases cortas, máximo 2 líneas por punto.\n\
- Si un dato falta escribe \"No disponible\". No inventes información externa.\n\n\
### Estructura\n\
### Análisis de Datos Fundamentales\n\
### Variación de Precios\n\
### Flujo de Efectivo\n\
### Análisis de Riesgo\n\
### Dividendos\n\
### Recomendaciones",
        fundamentals_table(&rows)
    );

    TextRequest {
        instructions: ANALYST_INSTRUCTIONS.to_string(),
        input,
        max_output_tokens: None,
    }
}

pub fn distribution_request(
    analysis: &str,
    scored: &[ScoreRecord],
    config: &AnalysisConfig,
) -> TextRequest {
    let budget = format_amount(config.budget);
    let minimum = format_amount(ceil_to_unit(config.min_investment.max(0)));
    let positions = selection_size(config.top_stocks_count, scored.len());

    let input = format!(
        "### Perfil del cliente\n\
- Nivel de riesgo: {risk}\n\
- Estrategia: {strategy}\n\
- Número de empresas: {positions}\n\n\
### Informe financiero\n{analysis}\n\n\
### Pesos calculados\n{weights}\n\n\
PRESUPUESTO TOTAL: ${budget}\n\n\
### Reglas\n\
1. El total debe ser exactamente ${budget}.\n\
2. Exactamente {positions} empresas, solo tickers de la tabla de pesos.\n\
3. Máximo 2 empresas por sector.\n\
4. Mínimo ${minimum} por empresa.\n\
5. Montos en múltiplos de $1,000.\n\
6. No muestres pasos intermedios.\n\n\
### Salida (solo esto)\n\
### Distribución de Inversión\n\
- TICKER | SECTOR: $ monto\n\
- ...\n\n\
**TOTAL: ${budget}**\n\n\
### Justificación\n\
- Coherencia con el perfil de riesgo\n\
- Diversificación lograda\n\
- Fortalezas de las empresas elegidas",
        risk = config.risk_level.as_str().to_uppercase(),
        strategy = strategy(config.risk_level),
        weights = weights_table(scored),
    );

    TextRequest {
        instructions: ADVISOR_INSTRUCTIONS.to_string(),
        input,
        max_output_tokens: None,
    }
}

fn strategy(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Conservative => "priorizar empresas estables con dividendos altos, beta baja y sectores defensivos",
        RiskLevel::Moderate => "balance entre empresas maduras con dividendos y algunas de crecimiento",
        RiskLevel::Aggressive => "priorizar crecimiento, mejor ROE y desempeño reciente",
    }
}

fn fundamentals_table(rows: &[&SecurityMetrics]) -> String {
    let mut out = String::from(
        "ticker | empresa | sector | roe | pe | var_1m | var_6m | margen | cf/deuda | crec_ingresos | crec_beneficios | beta | dividend_yield",
    );
    for s in rows {
        let f = &s.fundamentals;
        out.push('\n');
        out.push_str(
            &[
                s.ticker.clone(),
                s.name.clone(),
                s.sector.clone(),
                cell(f.roe),
                cell(f.pe_ratio),
                cell(f.change_1m),
                cell(f.change_6m),
                cell(s.profit_margin),
                cell(f.cash_flow_to_debt),
                cell(f.revenue_growth),
                cell(f.earnings_growth),
                cell(f.beta),
                cell(f.dividend_yield),
            ]
            .join(" | "),
        );
    }
    out
}

fn weights_table(scored: &[ScoreRecord]) -> String {
    let mut ranked: Vec<&ScoreRecord> = scored.iter().collect();
    ranked.sort_by(|a, b| {
        b.weight_assigned
            .total_cmp(&a.weight_assigned)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    let mut out = String::from("ticker | sector | score | weight");
    for r in ranked {
        out.push_str(&format!(
            "\n{} | {} | {:.4} | {:.4}",
            r.ticker, r.sector, r.score, r.weight_assigned
        ));
    }
    out
}

fn cell(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_prompt_states_budget_and_rules() {
        let scored = vec![ScoreRecord {
            ticker: "BCI.SN".into(),
            name: "BCI".into(),
            sector: "Banca".into(),
            score: 0.7,
            weight_assigned: 1.0,
        }];
        let config = AnalysisConfig {
            budget: 1_500_000,
            min_investment: 20_500,
            ..AnalysisConfig::default()
        };
        let req = distribution_request("informe", &scored, &config);
        assert!(req.input.contains("PRESUPUESTO TOTAL: $1,500,000"));
        assert!(req.input.contains("Mínimo $21,000 por empresa"));
        assert!(req.input.contains("Exactamente 1 empresas"));
        assert!(req.input.contains("BCI.SN | Banca | 0.7000 | 1.0000"));
    }

    #[test]
    fn analysis_prompt_prefers_dividend_payers() {
        let mut payer = SecurityMetrics::new("CCU.SN", "CCU", "Embotellados");
        payer.fundamentals.dividend_yield = Some(0.04);
        let other = SecurityMetrics::new("LTM.SN", "LATAM", "Transporte");
        let req = business_analysis_request(&[payer, other]);
        assert!(req.input.contains("CCU.SN | CCU | Embotellados"));
        assert!(!req.input.contains("LTM.SN"));
        assert!(!req.input.contains("PRESUPUESTO"));
    }
}
