//! Prompt constants and prompt assembly for the CV scoring oracle.
//!
//! The analysis prompt is a default: operators override it at runtime through
//! the `GEMINI_PROMPT_CV_ANALYSIS` setting.

/// System instruction sent with every scoring call.
pub const SYSTEM_INSTRUCTION: &str = "Você é um especialista em recursos humanos e análise \
    de currículos. Forneça análises detalhadas e construtivas em português brasileiro. \
    Responda SOMENTE com JSON válido, sem texto fora do objeto JSON e sem cercas de código.";

/// Default analysis prompt. The JSON skeleton below is the contract the
/// report parser validates against.
pub const DEFAULT_CV_ANALYSIS_PROMPT: &str = r#"Analise este currículo em português brasileiro e forneça uma avaliação detalhada no formato JSON.

Considere os seguintes aspectos:
1. Estrutura e formatação
2. Conteúdo e relevância das informações
3. Palavras-chave e termos técnicos
4. Experiência profissional
5. Formação acadêmica
6. Habilidades técnicas e comportamentais
7. Clareza e objetividade

Responda em português brasileiro com o seguinte formato JSON:
{
  "score": number (0-100),
  "overallFeedback": "string - feedback geral sobre o currículo",
  "strengths": ["array de pontos fortes"],
  "weaknesses": ["array de pontos fracos"],
  "suggestions": [
    {
      "category": "string - categoria da sugestão",
      "recommendation": "string - recomendação específica",
      "priority": "high|medium|low"
    }
  ],
  "keywordOptimization": {
    "present": ["palavras-chave encontradas"],
    "missing": ["palavras-chave que faltam"]
  },
  "formatFeedback": {
    "rating": number (1-5),
    "comments": ["comentários sobre formatação"]
  },
  "extractedData": {
    "name": "nome do candidato, se identificável",
    "title": "cargo ou título profissional atual",
    "contact": "e-mail ou telefone encontrado no currículo"
  }
}

Seja específico, construtivo e forneça sugestões práticas para melhorar o currículo."#;

/// Appends the per-request context blocks to the operator template: the file
/// name, the target role when given, and the prior report when a comparison
/// is wanted.
pub fn build_user_prompt(
    template: &str,
    file_name: &str,
    target_role: Option<&str>,
    previous_report: Option<&serde_json::Value>,
) -> String {
    let mut prompt = String::from(template);

    prompt.push_str(&format!("\n\nArquivo enviado: {file_name}"));

    if let Some(role) = target_role.map(str::trim).filter(|r| !r.is_empty()) {
        prompt.push_str(&format!(
            "\n\nCargo-alvo informado pelo candidato: {role}\n\
             Avalie a adequação do currículo a esse cargo e direcione as sugestões \
             de palavras-chave para ele."
        ));
    }

    if let Some(previous) = previous_report {
        prompt.push_str(&format!(
            "\n\nAnálise anterior deste candidato (JSON):\n{previous}\n\
             Compare o currículo atual com essa análise e inclua no JSON o campo adicional:\n\
             \"comparativeFeedback\": {{\n\
             \x20 \"improvementsMade\": [\"melhorias aplicadas desde a última análise\"],\n\
             \x20 \"pointsToStillImprove\": [\"pontos anteriores ainda não resolvidos\"]\n\
             }}"
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_prompt_has_no_optional_blocks() {
        let prompt = build_user_prompt(DEFAULT_CV_ANALYSIS_PROMPT, "cv.pdf", None, None);
        assert!(prompt.contains("Arquivo enviado: cv.pdf"));
        assert!(!prompt.contains("Cargo-alvo"));
        assert!(!prompt.contains("comparativeFeedback\":"));
    }

    #[test]
    fn test_target_role_block_included_when_present() {
        let prompt =
            build_user_prompt("modelo", "cv.pdf", Some("Engenheira de Dados"), None);
        assert!(prompt.starts_with("modelo"));
        assert!(prompt.contains("Cargo-alvo informado pelo candidato: Engenheira de Dados"));
    }

    #[test]
    fn test_blank_target_role_is_ignored() {
        let prompt = build_user_prompt("modelo", "cv.pdf", Some("   "), None);
        assert!(!prompt.contains("Cargo-alvo"));
    }

    #[test]
    fn test_previous_report_requests_comparison() {
        let previous = json!({ "score": 60 });
        let prompt = build_user_prompt("modelo", "cv.pdf", None, Some(&previous));
        assert!(prompt.contains("Análise anterior"));
        assert!(prompt.contains("\"score\":60"));
        assert!(prompt.contains("improvementsMade"));
    }
}
