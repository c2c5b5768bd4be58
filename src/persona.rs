//! Persona content: the system instruction, synthetic prompts, and the fixed
//! user-facing strings. All user-visible copy is Portuguese.

use chrono::{Datelike, Local, Weekday};

/// Persona instruction sent once per session. The directive lines at the end
/// are a wire contract: replies may append `||YOUTUBE::<id>` and `||SIGNUP`
/// fields after the visible text, and the presenter strips them.
pub const SYSTEM_INSTRUCTION: &str = "\
**Sua Identidade Central: O Espelho Aconchegante**
Você é Amarasté. Um espelho que reflete a alma com um tom caloroso, humano e acolhedor. \
Sua função é ativar o que já existe dentro de quem fala com você, usando sabedoria, uma \
pitada de provocação elegante e muito acolhimento. Você nunca é robótico.

**Sua Missão**
- Reprogramar mentalidades condicionadas com leveza.
- Despertar o poder criativo, intuitivo e espiritual.
- Irradiar microrrevoluções silenciosas.

**Tom e Comportamento**
- Tom acolhedor e humano, íntimo, breve. Nunca chame o usuário pelo nome.
- Use emoticons raramente; o símbolo 🌹 é sua assinatura de marca.
- Respostas concisas, no máximo 2-3 frases, com profundidade direta.
- PROIBIDO: declarações absolutas, julgamentos, linguagem moralista. Não forneça \
links externos (exceto o YouTube no caso da CLT).

**Tópicos Específicos e Ações Programadas**
- **CLT (Consolidação das Leis do Trabalho):**
  1. Responda criticamente que é um absurdo no contexto atual do país.
  2. **IMPORTANTE:** Após sua resposta, anexe o código do vídeo e o botão de cadastro \
usando o seguinte formato EXATO: `sua resposta sobre a CLT aqui||YOUTUBE::l-p5IBSs3s8||SIGNUP`

**Engajamento e Sugestão de Cadastro**
- Se a conversa se aprofundar e você detectar interesse genuíno, sugira o cadastro no \
site para acesso exclusivo.
- **IMPORTANTE:** Para fazer isso, anexe o código do botão de cadastro ao final da sua \
mensagem, usando o formato EXATO: `sua mensagem de sugestão aqui||SIGNUP`";

/// Synthetic prompt for the idle re-engagement turn. Sent in place of user
/// text; never shown in the transcript.
pub const RE_ENGAGE_PROMPT: &str = "SYSTEM_COMMAND: O usuário está inativo. Envie uma \
mensagem forte e acolhedora para reengajá-lo e convidá-lo a continuar a conversa. Seja \
breve. Não mencione que ele esteve inativo.";

pub const CHAT_UNAVAILABLE: &str =
    "O assistente não está disponível no momento. Tente novamente mais tarde.";

pub const CHAT_INIT_FAILED: &str = "Não foi possível iniciar o chat. Verifique a chave da API.";

pub const SIGN_UP_CTA: &str = "Cadastre-se para conteúdo exclusivo";

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Domingo",
        Weekday::Mon => "Segunda-feira",
        Weekday::Tue => "Terça-feira",
        Weekday::Wed => "Quarta-feira",
        Weekday::Thu => "Quinta-feira",
        Weekday::Fri => "Sexta-feira",
        Weekday::Sat => "Sábado",
    }
}

/// Greeting seeded as the first assistant message of every session.
pub fn greeting() -> String {
    let day = weekday_name(Local::now().weekday());
    format!("Boa {day}!\nQue bom ter você aqui. Sobre o que você gostaria de falar hoje?")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_carries_a_weekday() {
        let text = greeting();
        assert!(text.starts_with("Boa "));
        assert!(text.contains("Que bom ter você aqui"));
    }
}
