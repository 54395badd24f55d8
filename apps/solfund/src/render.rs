//! Plain-text rendering of joined views.

use std::fmt::Write as _;

use client_core::{BackedCampaign, CampaignDetail, CampaignView, Profile};
use shared::domain::Lamports;

pub fn campaign_line(view: &CampaignView) -> String {
    let mut line = format!(
        "{}  {}  {} / {}  {:.0}%  {}",
        view.address,
        view.metadata.title,
        view.state.raised(),
        view.state.goal(),
        view.progress.percent_funded,
        view.progress.status,
    );
    if view.progress.days_left > 0 {
        let _ = write!(line, "  {}d left", view.progress.days_left);
    }
    if view.progress.almost_up {
        line.push_str("  (almost up)");
    }
    line
}

pub fn campaign_list(views: &[CampaignView]) -> String {
    if views.is_empty() {
        return "No campaigns found.".into();
    }
    views
        .iter()
        .map(campaign_line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn detail(detail: &CampaignDetail) -> String {
    let campaign = &detail.campaign;
    let mut out = campaign_line(campaign);
    if !campaign.metadata.short_description.is_empty() {
        let _ = write!(out, "\n{}", campaign.metadata.short_description);
    }
    if let Some(cover) = campaign.metadata.cover_image() {
        let _ = write!(out, "\nimage: {cover}");
    }
    for social in &campaign.metadata.socials {
        let _ = write!(out, "\n{}: {}", social.platform, social.url);
    }

    out.push_str("\n\nTiers:");
    for (index, offer) in detail.tiers.iter().enumerate() {
        let _ = write!(
            out,
            "\n  [{index}] {} - {} ({} NFT){}",
            offer.tier.title,
            offer.tier.price(),
            offer.tier.nft_reward_count,
            if offer.available { "" } else { "  unavailable" },
        );
    }

    let _ = write!(out, "\n\nBackers ({}):", detail.backers.len());
    for backer in &detail.backers {
        let _ = write!(
            out,
            "\n  {}  {}{}",
            backer.account.contributor,
            backer.account.amount(),
            if backer.account.refunded { "  refunded" } else { "" },
        );
    }

    match detail.rating_summary.average {
        Some(average) => {
            let _ = write!(
                out,
                "\n\nRating: {average:.1} / 5 from {} review(s)",
                detail.rating_summary.count
            );
        }
        None => out.push_str("\n\nNo ratings yet."),
    }
    for rating in detail.ratings.iter().filter(|r| !r.comment.is_empty()) {
        let _ = write!(out, "\n  {}★ {}", rating.score, rating.comment);
    }
    out
}

fn backed_line(backed: &BackedCampaign) -> String {
    let mut line = format!(
        "{}  contributed {}",
        campaign_line(&backed.campaign),
        backed.claim.account.amount()
    );
    if backed.claim.account.refunded {
        line.push_str("  refunded");
    } else if backed.refundable {
        line.push_str("  refund available");
    }
    line
}

pub fn profile(profile: &Profile) -> String {
    let mut out = format!("Wallet {}\n\nCreated:\n", profile.wallet);
    out.push_str(&campaign_list(&profile.created));
    for metadata in &profile.unconfirmed {
        let _ = write!(
            out,
            "\n{}  {}  {} / {}  (no on-chain account)",
            metadata.id,
            metadata.title,
            Lamports::ZERO,
            metadata.goal(),
        );
    }

    out.push_str("\n\nBacked:\n");
    if profile.backed.is_empty() {
        out.push_str("No campaigns found.");
    } else {
        let lines: Vec<String> = profile.backed.iter().map(backed_line).collect();
        out.push_str(&lines.join("\n"));
    }

    let refundable: Lamports = profile
        .refundable()
        .fold(Lamports::ZERO, |sum, backed| sum.saturating_add(backed.claim.account.amount()));
    let _ = write!(
        out,
        "\n\nRefundable: {} campaign(s), {}",
        profile.refundable().count(),
        refundable
    );
    out
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
