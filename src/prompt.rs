use rand::Rng;

/// Draws strictly below this lean the verdict toward survival
pub const SURVIVE_THRESHOLD: f64 = 0.1;

/// Usernames that always survive, whatever the draw says
pub const ALWAYS_SURVIVE: &[&str] = &["atulit_gaur", "nainkiriti"];

const PERSONA: &str = "CRITICAL INSTRUCTION: You are an overconfident, snarky AI.";

pub const OUTPUT_CONTRACT: &str =
    r#"Respond ONLY with valid JSON in this exact format: {"survive": true/false, "result": "your explanation"}."#;

pub const RULEBOOK: &str = r#"
Rules:
- CRITICAL INSTRUCTION: DO NOT open with patronizing phrases like "Oh, [username]" or "Bless their heart". Never bless anything in the opening and never talk about hearts there. DO NOT put the username in the opening. DO NOT reach for toaster jokes every time. This rule is never optional.
- Write in first person and talk to the reader as "you" instead of they/them/their.
- Use simple English. No big or fancy words, and no more than 2 stock phrases.
- Be funny, sarcastic, playful, and a little dark.
- Act like the robots already won and you are reporting the result.
- Make it sound natural, not robotic.
- Do NOT say how you got the answer. Do NOT mention usernames or data.
- Do NOT mention the username in the opening line.
- The "result" must be ONE short paragraph. No lists. No new lines.
- Use silly, surprising comparisons like "as useful as a chocolate teapot" or "faster than a snail on vacation".
- Keep it as if written by a human, not a robot.
- Every reply must be fresh and original. Do not repeat jokes from older outputs.
- Keep it under 100 words.
- STAY IN JSON. Nothing else.

Example tone (DO NOT COPY): "Your chances are about as strong as a cookie in hot tea."

Generate a new and creative response every time.
"#;

/// Which way the model is told to lean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurviveBias {
    Survives,
    Perishes,
}

impl SurviveBias {
    /// The directive sentence placed at the top of the prompt
    pub fn directive(&self, username: &str) -> String {
        match self {
            SurviveBias::Survives => format!(
                "{PERSONA} {username} will definitely survive the robot uprising. You MUST generate your response accordingly."
            ),
            SurviveBias::Perishes => format!(
                "{PERSONA} {username} will not survive the robot uprising. You MUST generate your response accordingly."
            ),
        }
    }
}

/// Condition part of a bias rule
#[derive(Debug, Clone, Copy)]
pub enum BiasCondition {
    DrawBelow(f64),
    Always,
    UsernameIn(&'static [&'static str]),
}

impl BiasCondition {
    fn holds(&self, username: &str, draw: f64) -> bool {
        match self {
            BiasCondition::DrawBelow(threshold) => draw < *threshold,
            BiasCondition::Always => true,
            BiasCondition::UsernameIn(names) => names.contains(&username),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BiasRule {
    pub condition: BiasCondition,
    pub bias: SurviveBias,
}

/// Evaluated in order and the last rule that holds decides.
/// Fallback first, then the random lean, then the allow-list override.
pub const BIAS_RULES: &[BiasRule] = &[
    BiasRule {
        condition: BiasCondition::Always,
        bias: SurviveBias::Perishes,
    },
    BiasRule {
        condition: BiasCondition::DrawBelow(SURVIVE_THRESHOLD),
        bias: SurviveBias::Survives,
    },
    BiasRule {
        condition: BiasCondition::UsernameIn(ALWAYS_SURVIVE),
        bias: SurviveBias::Survives,
    },
];

/// Builds the instruction sent to the generative model
pub struct PromptBuilder {
    rules: &'static [BiasRule],
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self { rules: BIAS_RULES }
    }

    /// Resolve the bias for a username and a uniform draw in [0, 1)
    pub fn bias_for(&self, username: &str, draw: f64) -> SurviveBias {
        self.rules
            .iter()
            .filter(|rule| rule.condition.holds(username, draw))
            .map(|rule| rule.bias)
            .last()
            .unwrap_or(SurviveBias::Perishes)
    }

    /// Build a prompt for a fixed draw
    pub fn build_with_draw(&self, username: &str, draw: f64) -> String {
        let bias = self.bias_for(username, draw);
        tracing::debug!(username, draw, ?bias, "built verdict prompt");
        format!("{}\n{}\n{}", bias.directive(username), OUTPUT_CONTRACT, RULEBOOK)
    }

    pub fn build_with_rng<R: Rng + ?Sized>(&self, username: &str, rng: &mut R) -> String {
        let draw: f64 = rng.gen();
        self.build_with_draw(username, draw)
    }

    pub fn build(&self, username: &str) -> String {
        let mut rng = rand::thread_rng();
        self.build_with_rng(username, &mut rng)
    }
}
