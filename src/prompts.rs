//! Prompt templates for the structured generation stages.

pub const RESEARCH_SYSTEM: &str = "You are an expert in web research. Summarize all the websites researched and give the final response. This research is going to be used for a YouTube shorts script, so make sure to write in a way that is suitable for a YouTube video. Research on detailed visual description of the topic, as this will be used for generating AI images for the video. Make sure to include a detailed description of the topic, and make it engaging for the audience.";

const SCENES_FORMAT: &str = r#"Respond with JSON only, in this shape:
{"scenes": [{"scene": "Description of the scene", "narration": "Narration for the scene"}]}"#;

const METADATA_FORMAT: &str = r#"Respond with JSON only, in this shape:
{"title": "...", "description": "...", "keywords": ["...", "..."]}"#;

const IMAGE_PROMPT_FORMAT: &str = r#"Respond with JSON only, in this shape:
{"image_prompt": "Your image prompt here"}"#;

pub fn scenes_prompt(topic: &str, storyline: &str) -> String {
    format!(
        "You are a video content creator specializing in breaking down topics into engaging video scenes with narration. \
Given a topic and the content provided by an AI research agent, create a list of scenes with narration that capture the essence of the content while following a standard video structure. \
The number of scenes should be appropriate for the content, typically ranging from 4 to 5 scenes.

Topic: {topic}
Content: {storyline}

Create a list of scenes with narration that includes:
1. An introduction scene with narration setting up the video's theme
2. Multiple content scenes with narration covering the main points
3. A conclusion scene with narration summarizing key takeaways
4. An outro scene with narration with a call-to-action

Each scene should be a brief description (2-3 sentences) that sets up a clear visual moment or action. Ensure the scenes flow logically and maintain viewer engagement throughout the video.
Each narration should be concise, short (20-25 words) and should be like narrating the story.

{SCENES_FORMAT}"
    )
}

pub fn metadata_prompt(storyline: &str, theme: &str) -> String {
    format!(
        "You are a digital content strategist specializing in creating engaging metadata for videos. \
Given a storyline and the theme of the video, create a compelling title, description, and list of keywords that will help the video perform well on social media and video platforms.

Storyline: {storyline}
Theme: {theme}

Ensure the title is catchy and under 100 characters, the description is engaging and between 100-500 characters, and include 5-10 relevant keywords.

{METADATA_FORMAT}"
    )
}

pub fn image_prompt(previous_scene: &str, previous_prompt: &str, scene_description: &str) -> String {
    format!(
        "You are a cinematographer creating concise image prompts for cinematic scenes and specializing in visual storytelling and cinematic narrative design. \
For each scene description, generate a brief but evocative image prompt that includes:

1. A key visual element (e.g., camera angle, lighting style)
2. The overall mood or atmosphere
3. A notable cinematic technique or style reference

Previous Scene Description: {previous_scene}
Previous Image Prompt: {previous_prompt}
Current Scene: {scene_description}

Keep the prompt to 1-2 sentences, focusing on the most impactful visual aspects that capture the scene's essence. \
Ensure that your prompt connects visually and thematically with the previous scene's description and prompt when provided.

{IMAGE_PROMPT_FORMAT}"
    )
}
