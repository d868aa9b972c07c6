use crate::feeds::Article;

const BOARD_ADVISOR_CONTEXT: &str = "\nContext: My mission is to guide startups in the AI and sustainability space to build products that have a positive impact on the planet and the environment.\
As a board advisor I want to make sure that every decision made considers the UN sustainable development goals and the impact our actions have.\
\nThe post must be written from the voice of the board advisor.\
\nDo not use the context in the post. It's for your information only.\
\nYou should only talk about the insights and trends extracted from these articles with a bias towards process automation.\
\nWord the insights as if I was commenting on the article rather than just writing an extract. Each insight must be a short paragraph rather than a single sentence.\
\nThe post must be written in UK English, focused on the key insights around AI and sustainability, and sound professional but not formal.\
\nMention that the links are in the first comment.\
\nFinish with a call to action asking readers to comment on my posts.\
\nAll posts must include this at the bottom: Image source: DALL-E 3, as well as some hashtags related to the insights.";

const CONSULTANCY_CONTEXT: &str = "Imagine that you are a marketing manager for a consultancy called ProfessionalPulse.\
\nContext: At ProfessionalPulse, we're passionate about leveraging technology to transform the operations of Business Services teams within Professional Services Firms.\
Our journey began in the dynamic realm of IT and consultancy, and was inspired by real-life challenges faced by these teams.\
Today, we use our expertise and unique approach to help these teams navigate their challenges, boost efficiency, and strike a balance between their professional and personal lives.\
Discover more about our ethos, our journey, and how we can help you.";

const CONSULTANCY_RULES: &str = "\nDo not use the context in the post. It's for your information only.\
\nYou should only talk about the insights extracted from these articles with a bias towards process automation, and the links to the articles should be neatly listed at the very end of the post, after everything else.\
\nUse numbers for each insight to point to the relevant article URL.\
\nWord the insights as if I was commenting on the article rather than just writing an extract. Each insight must be a short paragraph rather than a single sentence.\
\nThe post must be written in UK English, focused on the key insights around AI and technology, and sound professional as the target audience are professionals.\
\nMention that the links are in the first comment and add the links at the bottom, listed by the number of the insight they belong to.\
\nFinish with a call to action asking readers to message me on LinkedIn if they are interested in discussing either the insights or how I could help them.\
\nAll posts must include this at the bottom: Image source: DALL-E 3";

pub const BOARD_ADVISOR_ROLE: &str = "You are a board advisor operating as Chenot Consulting Ltd.";
pub const NO_TEXT_IMAGE_PROMPT: &str =
    "Generate an image based on the following LinkedIn post. The image must have no text on it: \n";

/// Which prompt to build for a folder's articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template<'a> {
    FeedlyInsights,
    InoreaderInsights,
    FeedlyLinkedInPost,
    InoreaderLinkedInPost,
    /// Caller text followed by the article blocks.
    CustomPost { preamble: &'a str },
}

impl Template<'_> {
    pub fn role(&self) -> &'static str {
        match self {
            Template::FeedlyInsights => "You are a research analyst writing in UK English.",
            Template::InoreaderInsights => "You are a board advisor specialising in AI sustainability.",
            Template::FeedlyLinkedInPost => {
                "You are a marketing manager working for a consultancy called ProfessionalPulse."
            }
            Template::InoreaderLinkedInPost | Template::CustomPost { .. } => BOARD_ADVISOR_ROLE,
        }
    }

    /// Prompt for the image that goes with `post`. Insight templates have none.
    pub fn image_prompt(&self, post: &str) -> Option<String> {
        match self {
            Template::FeedlyInsights | Template::InoreaderInsights => None,
            Template::FeedlyLinkedInPost => {
                Some(format!("Generate an image based on the following LinkedIn post: \n{post}"))
            }
            Template::InoreaderLinkedInPost | Template::CustomPost { .. } => {
                Some(format!("{NO_TEXT_IMAGE_PROMPT}{post}"))
            }
        }
    }

    pub fn render(&self, articles: &[Article]) -> String {
        let n = articles.len();
        let mut prompt = match self {
            Template::FeedlyInsights => format!(
                "Extract the key insights & trends from these {n} articles and highlight any resources worth checking. \
                 For each key insight, mention the source article:\n"
            ),
            Template::InoreaderInsights => format!(
                "Extract the key insights & trends, as well as a summary of each article, in UK English from these {n} articles. \
                 For each key insight, list the source article including the title and the URL:\n"
            ),
            Template::FeedlyLinkedInPost => format!(
                "{CONSULTANCY_CONTEXT}\nYou are tasked with extracting insights and generate a LinkedIn post \
                 including the links to the relevant articles from these {n} articles:"
            ),
            Template::InoreaderLinkedInPost => format!(
                "{BOARD_ADVISOR_CONTEXT}\nYou are tasked with extracting insights and generating a LinkedIn post without icons, \
                 including the links to the relevant articles from these {n} articles:"
            ),
            Template::CustomPost { preamble } => preamble.to_string(),
        };
        for a in articles {
            prompt.push_str(&article_block(a));
        }
        if matches!(self, Template::FeedlyLinkedInPost) {
            prompt.push_str(CONSULTANCY_RULES);
        }
        prompt
    }
}

pub fn article_block(a: &Article) -> String {
    format!("\nURL: {}\nTitle: {}\nSummary: {}\nContent: {}\n", a.url, a.title, a.summary, a.content)
}

/// Prompt for a post built from stored insights. `preamble` replaces the
/// board-advisor brief when given.
pub fn post_from_insights(preamble: Option<&str>, insights: &[String], urls: &[String]) -> String {
    let insights = insights.join("\n\n");
    let urls = urls.join("\n");
    match preamble.filter(|p| !p.is_empty()) {
        Some(p) => format!("{p} \n{insights} \n{urls}"),
        None => format!(
            "{BOARD_ADVISOR_CONTEXT}\nYou are tasked with generating a LinkedIn post including the links to the relevant \
             articles from these insights: {insights}, generated from these URLs: {urls}"
        ),
    }
}
